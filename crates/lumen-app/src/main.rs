// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_core::{init_tracing, load_cfg, AppCfg, PresentModeCfg};
use lumen_platform::{DesktopWindow, WindowSettings};
use lumen_render::{ChainSettings, PresentModePreference, PresentationLoop};
use lumen_render_vk::{DeviceConfig, DiagnosticSeverity, DiagnosticsSink, SurfaceContext};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Initial window width (overrides the config file)
    #[arg(long)]
    width: Option<u32>,
    /// Initial window height (overrides the config file)
    #[arg(long)]
    height: Option<u32>,
    /// Config file; missing means defaults
    #[arg(long, default_value = "lumen.toml")]
    config: PathBuf,
    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
}

fn apply_overrides(cfg: &mut AppCfg, args: &Args) {
    if let Some(w) = args.width {
        cfg.window.width = w;
    }
    if let Some(h) = args.height {
        cfg.window.height = h;
    }
    if args.validation {
        cfg.render.validation = true;
    }
}

fn present_mode(mode: PresentModeCfg) -> PresentModePreference {
    match mode {
        PresentModeCfg::Fifo => PresentModePreference::Fifo,
        PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
    }
}

fn diagnostics_sink() -> DiagnosticsSink {
    Box::new(|severity, msg| match severity {
        DiagnosticSeverity::Error => error!("[Vulkan] {msg}"),
        DiagnosticSeverity::Warning => warn!("[Vulkan] {msg}"),
        DiagnosticSeverity::Info => info!("[Vulkan] {msg}"),
        DiagnosticSeverity::Verbose => debug!("[Vulkan] {msg}"),
    })
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    apply_overrides(&mut cfg, &args);
    info!(
        "window {}x{}, present mode {:?}, frames in flight {}",
        cfg.window.width,
        cfg.window.height,
        cfg.render.present_mode,
        cfg.render.frames_in_flight()
    );

    let window = DesktopWindow::new(WindowSettings {
        title: cfg.window.title.clone(),
        width: cfg.window.width,
        height: cfg.window.height,
    })?;

    let device_cfg = DeviceConfig {
        app_name: cfg.window.title.clone(),
        validation: cfg.render.validation,
    };
    let gpu = SurfaceContext::new(&window, &device_cfg, Some(diagnostics_sink()))
        .context("Vulkan init")?;
    if cfg.render.validation && !gpu.validation_enabled() {
        warn!("running without validation messages");
    }

    let settings = ChainSettings {
        present_mode: present_mode(cfg.render.present_mode),
        clear_color: cfg.render.clear_color,
    };
    let mut presentation =
        PresentationLoop::new(gpu, window, settings, cfg.render.frames_in_flight())
            .context("swapchain setup")?;
    presentation.run().context("presentation")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_override_file() {
        let args = Args::try_parse_from(["lumen", "--width", "1280", "--validation"]).unwrap();
        let mut cfg = AppCfg::default();
        apply_overrides(&mut cfg, &args);
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 600);
        assert!(cfg.render.validation);
        assert_eq!(args.config, PathBuf::from("lumen.toml"));
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let args = Args::try_parse_from(["lumen", "--config", "other.toml"]).unwrap();
        let mut cfg = AppCfg::default();
        cfg.render.validation = true;
        cfg.window.height = 900;
        apply_overrides(&mut cfg, &args);
        assert!(cfg.render.validation);
        assert_eq!(cfg.window.height, 900);
        assert_eq!(args.config, PathBuf::from("other.toml"));
    }

    #[test]
    fn present_mode_maps_one_to_one() {
        assert_eq!(present_mode(PresentModeCfg::Fifo), PresentModePreference::Fifo);
        assert_eq!(present_mode(PresentModeCfg::Mailbox), PresentModePreference::Mailbox);
    }
}
