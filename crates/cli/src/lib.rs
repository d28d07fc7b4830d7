use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pupilmeter_core::{
    CalibrationSource, DetectedLandmark, EngineConfig, FixedLandmarks, ImageInfo, LandmarkDetector,
    MeasurementSession, NoDetector, ReferenceKind, TouchPoint, ViewportPoint,
    SUGGESTED_LENGTHS_MM,
};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "pupilmeter-cli")]
#[command(about = "Pupilmeter CLI")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replay a session script and print the committed measurement.
    Measure {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
        /// Engine configuration file (JSON). Defaults to PUPILMETER_* variables.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print the overlay frame after the last event instead of committing.
        #[arg(long)]
        overlay: bool,
    },
    /// Print the effective engine configuration.
    Config {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print calibration reference kinds and suggested lengths.
    References {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

/// One calibration reference kind as offered to the operator
#[derive(Debug, Serialize)]
struct ReferenceInfo {
    reference: ReferenceKind,
    default_length_mm: f64,
    /// `[min, max]`; absent when any length is accepted
    plausible_range_mm: Option<[f64; 2]>,
}

#[derive(Debug, Serialize)]
struct ReferenceCatalog {
    suggested_lengths_mm: [f64; 3],
    references: Vec<ReferenceInfo>,
}

#[derive(Debug, Deserialize)]
struct Size {
    width: f64,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct CalibrationScript {
    #[serde(flatten)]
    source: CalibrationSource,
    length_mm: Option<f64>,
}

/// A recorded measurement session
#[derive(Debug, Deserialize)]
struct SessionScript {
    image: ImageInfo,
    viewport: Size,
    calibration: CalibrationScript,
    #[serde(default)]
    glasses: bool,
    /// Detector output; absent means no detector is available
    landmarks: Option<Vec<DetectedLandmark>>,
    #[serde(default)]
    events: Vec<ScriptEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
enum ScriptEvent {
    PointerDown { x: f64, y: f64, t: f64 },
    PointerMove { x: f64, y: f64, t: f64 },
    PointerUp { x: f64, y: f64, t: f64 },
    Cancel,
    Wheel { x: f64, y: f64, delta: f64 },
    TouchStart { touches: Vec<TouchPoint>, t: f64 },
    TouchMove { touches: Vec<TouchPoint>, t: f64 },
    TouchEnd { ended: TouchPoint, remaining: Vec<TouchPoint>, t: f64 },
    Tick { ms: u64 },
    ZoomIn,
    ZoomOut,
    ResetView,
    Nudge { anchor: String, dx: f64, dy: f64 },
    Calibrate { length_mm: f64 },
    Glasses { enabled: bool },
    Resize { width: f64, height: f64 },
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Measure { script, config, overlay } => {
            run_measure(&script, config.as_deref(), overlay)
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::References { config } => {
            let config = load_config(config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&reference_catalog(&config))?);
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => EngineConfig::from_env().context("invalid PUPILMETER_* environment"),
    }
}

/// Coins are left out: their length is the diameter the operator enters.
fn reference_catalog(config: &EngineConfig) -> ReferenceCatalog {
    let kinds = [
        ReferenceKind::InnerCanthal,
        ReferenceKind::PupillaryDistance,
        ReferenceKind::CreditCard,
        ReferenceKind::Ruler,
        ReferenceKind::Custom,
    ];
    let references = kinds
        .into_iter()
        .map(|reference| ReferenceInfo {
            reference,
            default_length_mm: reference.default_length_mm(config.default_ruler_length_mm),
            plausible_range_mm: reference.plausible_range().map(|r| [*r.start(), *r.end()]),
        })
        .collect();

    ReferenceCatalog { suggested_lengths_mm: SUGGESTED_LENGTHS_MM, references }
}

fn run_measure(script_path: &Path, config_path: Option<&Path>, overlay: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let text = fs::read_to_string(script_path)
        .with_context(|| format!("failed to read session script {}", script_path.display()))?;
    let script: SessionScript = serde_json::from_str(&text).context("invalid session script")?;

    let detector: Arc<dyn LandmarkDetector> = match script.landmarks {
        Some(landmarks) => Arc::new(FixedLandmarks::new(landmarks)),
        None => Arc::new(NoDetector),
    };
    let mut session = MeasurementSession::new(config, detector);

    let engine = session.load_image(script.image, script.calibration.source);
    engine.set_container_size(script.viewport.width, script.viewport.height);
    if let Some(length_mm) = script.calibration.length_mm {
        engine.set_calibration_length(length_mm);
    }
    engine.set_glasses_mode(script.glasses);

    log::info!("replaying {} events", script.events.len());
    for (index, event) in script.events.into_iter().enumerate() {
        apply_event(&mut session, event).with_context(|| format!("event {index} failed"))?;
    }

    let engine = session.engine().context("no image loaded")?;
    let json = if overlay {
        serde_json::to_string_pretty(&engine.overlay_frame())?
    } else {
        serde_json::to_string_pretty(&engine.commit())?
    };
    println!("{json}");

    Ok(())
}

fn apply_event(session: &mut MeasurementSession, event: ScriptEvent) -> Result<()> {
    if let ScriptEvent::Tick { ms } = event {
        session.tick(Duration::from_millis(ms));
        return Ok(());
    }

    let engine = session.engine_mut().context("no image loaded")?;
    match event {
        ScriptEvent::PointerDown { x, y, t } => {
            engine.pointer_down(ViewportPoint::new(x, y), t);
        }
        ScriptEvent::PointerMove { x, y, t } => {
            engine.pointer_move(ViewportPoint::new(x, y), t);
        }
        ScriptEvent::PointerUp { x, y, t } => {
            engine.pointer_up(ViewportPoint::new(x, y), t);
        }
        ScriptEvent::Cancel => engine.cancel(),
        ScriptEvent::Wheel { x, y, delta } => {
            engine.wheel(ViewportPoint::new(x, y), delta);
        }
        ScriptEvent::TouchStart { touches, t } => {
            engine.touch_start(&touches, t);
        }
        ScriptEvent::TouchMove { touches, t } => {
            engine.touch_move(&touches, t);
        }
        ScriptEvent::TouchEnd { ended, remaining, t } => {
            engine.touch_end(&ended, &remaining, t);
        }
        ScriptEvent::ZoomIn => {
            engine.zoom_in();
        }
        ScriptEvent::ZoomOut => {
            engine.zoom_out();
        }
        ScriptEvent::ResetView => {
            engine.reset_view();
        }
        ScriptEvent::Nudge { anchor, dx, dy } => {
            engine.nudge_anchor(&anchor, dx, dy)?;
        }
        ScriptEvent::Calibrate { length_mm } => engine.set_calibration_length(length_mm),
        ScriptEvent::Glasses { enabled } => engine.set_glasses_mode(enabled),
        ScriptEvent::Resize { width, height } => engine.set_container_size(width, height),
        ScriptEvent::Tick { .. } => {}
    }
    Ok(())
}
