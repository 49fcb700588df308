use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStyle {
    Halo,
    Stacked,
    Diagonal,
}

impl LayoutStyle {
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "halo" => Some(Self::Halo),
            "stacked" => Some(Self::Stacked),
            "diagonal" => Some(Self::Diagonal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub style: LayoutStyle,
    pub grid_unit: f32,
    pub trace_spacing: f32,
    pub pen_step: f32,
    pub channel_offset: f32,
    pub core_gap: f32,
    pub gene_extra_height: f32,
    pub cell_padding: f32,
    pub cluster: ClusterConfig,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            style: LayoutStyle::Stacked,
            grid_unit: 10.0,
            trace_spacing: 10.0,
            pen_step: 20.0,
            channel_offset: 10.0,
            core_gap: 20.0,
            gene_extra_height: 10.0,
            cell_padding: 20.0,
            cluster: ClusterConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Rounds `value` up to the next multiple of the layout grid unit.
    pub fn snap_up(&self, value: f32) -> f32 {
        let unit = self.grid_unit.max(1.0);
        (value / unit - 1e-4).ceil() * unit
    }

    /// Rounds `value` to the nearest multiple of the layout grid unit.
    pub fn snap(&self, value: f32) -> f32 {
        let unit = self.grid_unit.max(1.0);
        (value / unit).round() * unit
    }

    pub fn is_stacked(&self) -> bool {
        self.style == LayoutStyle::Stacked
    }
}

/// Fixed padding used to cover width and height underestimates.
///
/// These constants are deliberately conservative: trace offsets and track
/// counts downstream are tuned against them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub fan_in_padding: f32,
    pub fan_out_padding: f32,
    pub fan_out_width_pad: f32,
    pub height_padding: f32,
    pub bottom_padding: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            fan_in_padding: 30.0,
            fan_out_padding: 30.0,
            fan_out_width_pad: 20.0,
            height_padding: 20.0,
            bottom_padding: 10.0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    style: Option<String>,
    grid_unit: Option<f32>,
    trace_spacing: Option<f32>,
    pad_width: Option<f32>,
    pen_step: Option<f32>,
    channel_offset: Option<f32>,
    core_gap: Option<f32>,
    gene_extra_height: Option<f32>,
    cell_padding: Option<f32>,
    cluster: Option<ClusterConfigFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfigFile {
    fan_in_padding: Option<f32>,
    fan_out_padding: Option<f32>,
    fan_out_width_pad: Option<f32>,
    height_padding: Option<f32>,
    bottom_padding: Option<f32>,
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<LayoutConfig> {
    let mut config = LayoutConfig::default();
    let Some(path) = path else {
        return Ok(config);
    };

    let contents = std::fs::read_to_string(path)?;
    let parsed = parse_config_file(&contents)?;
    apply_config_file(&mut config, parsed)?;
    Ok(config)
}

fn parse_config_file(contents: &str) -> anyhow::Result<ConfigFile> {
    match serde_json::from_str::<ConfigFile>(contents) {
        Ok(parsed) => Ok(parsed),
        // Hand-edited configs often carry comments or trailing commas.
        Err(json_err) => json5::from_str::<ConfigFile>(contents)
            .map_err(|json5_err| anyhow::anyhow!("invalid config: {json_err}; {json5_err}")),
    }
}

fn apply_config_file(config: &mut LayoutConfig, parsed: ConfigFile) -> anyhow::Result<()> {
    if let Some(style) = parsed.style.as_deref() {
        config.style = LayoutStyle::from_token(style)
            .ok_or_else(|| anyhow::anyhow!("unknown layout style: {style}"))?;
    }
    if let Some(v) = parsed.grid_unit {
        anyhow::ensure!(v > 0.0, "gridUnit must be positive");
        config.grid_unit = v;
    }
    if let Some(v) = parsed.trace_spacing {
        config.trace_spacing = v;
    }
    // Pad pitch is fixed per glyph kind (`ir::GLYPH_PAD_WIDTH`).
    anyhow::ensure!(parsed.pad_width.is_none(), "padWidth is not configurable");
    if let Some(v) = parsed.pen_step {
        config.pen_step = v;
    }
    if let Some(v) = parsed.channel_offset {
        config.channel_offset = v;
    }
    if let Some(v) = parsed.core_gap {
        config.core_gap = v;
    }
    if let Some(v) = parsed.gene_extra_height {
        config.gene_extra_height = v;
    }
    if let Some(v) = parsed.cell_padding {
        config.cell_padding = v;
    }
    if let Some(cluster) = parsed.cluster {
        if let Some(v) = cluster.fan_in_padding {
            config.cluster.fan_in_padding = v;
        }
        if let Some(v) = cluster.fan_out_padding {
            config.cluster.fan_out_padding = v;
        }
        if let Some(v) = cluster.fan_out_width_pad {
            config.cluster.fan_out_width_pad = v;
        }
        if let Some(v) = cluster.height_padding {
            config.cluster.height_padding = v;
        }
        if let Some(v) = cluster.bottom_padding {
            config.cluster.bottom_padding = v;
        }
    }
    Ok(())
}
