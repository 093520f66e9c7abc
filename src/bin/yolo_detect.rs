//! yolo_detect - run a YOLO detector over images, folders, videos or cameras

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use yolo_annotate::display::{install_interrupt_handler, HeadlessDisplay, StdinDisplay};
use yolo_annotate::record::open_recorder;
use yolo_annotate::ui::Ui;
use yolo_annotate::{
    load_detector, Display, FrameSource, Pipeline, PipelineError, RunConfig, RunRequest,
    StartupPlan, RENDER_THRESHOLD,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the model file (.onnx, or a .json fixture model).
    #[arg(long)]
    model: PathBuf,
    /// Image file, image folder, video file, or USB camera (`usb0`).
    #[arg(long)]
    source: String,
    /// Minimum confidence threshold.
    #[arg(long, default_value_t = 0.5)]
    thresh: f32,
    /// Display and record resolution as WxH (e.g. 640x480).
    #[arg(long)]
    resolution: Option<String>,
    /// Record annotated frames (video/camera only; requires --resolution).
    #[arg(long)]
    record: bool,
    /// Write Label Studio predictions to this JSON file.
    #[arg(long = "save_output", value_name = "PATH")]
    save_output: Option<PathBuf>,
    /// Console rendering: auto, plain, or pretty.
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
    /// Read key commands from stdin when showing still images.
    #[arg(long)]
    interactive: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        match err.downcast_ref::<PipelineError>() {
            Some(pipeline_err) if pipeline_err.is_startup() => eprintln!("{pipeline_err}"),
            _ => eprintln!("error: {err:#}"),
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let request = RunRequest {
        model: args.model,
        source: args.source,
        thresh: args.thresh,
        resolution: args.resolution,
        record: args.record,
        save_output: args.save_output,
    };
    let plan = StartupPlan::validate(&request)?;
    let config = RunConfig::load()?;
    log::info!(
        "source {} ({}), minimum confidence {:.2}, render threshold {:.2}",
        request.source,
        plan.source.kind(),
        plan.min_thresh,
        RENDER_THRESHOLD
    );

    let ui = Ui::from_args(Some(&args.ui), std::io::stderr().is_terminal());

    let mut detector = {
        let _stage = ui.stage("Load model");
        load_detector(&plan.model)?
    };

    let mut source = FrameSource::open(&plan.source, plan.resolution, config.progress_every)?;
    let recorder = open_recorder(&plan, &config.record)?;

    let interrupted = install_interrupt_handler()?;
    let mut display: Box<dyn Display> = if args.interactive {
        Box::new(StdinDisplay::stdin(interrupted))
    } else {
        Box::new(HeadlessDisplay::new(interrupted))
    };

    let progress = ui.run_progress(source.stats().images_total);
    let summary = {
        let _stage = ui.stage("Run detection");
        Pipeline::new(config, plan.export_path.clone(), recorder)
            .with_progress(progress)
            .run(&mut source, detector.as_mut(), display.as_mut())?
    };

    log::info!(
        "processed {} frames, {} objects, {} images skipped",
        summary.frames_processed,
        summary.objects_counted,
        summary.images_skipped
    );
    println!("Average pipeline FPS: {:.2}", summary.average_fps);
    Ok(())
}
