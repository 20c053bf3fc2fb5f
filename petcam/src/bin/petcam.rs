//! Petcam server binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use clap::Parser;
use env_logger::TimestampPrecision;
use petcam::{
    controller::DetectorSession,
    endpoints::{annotated_stream, counters, healthcheck, index, start_live, status, stop_live, upload_image},
    meter::spawn_meter_logger,
    nn::SsdMobilenet,
    notify::TerminalBell,
    overlay::{OverlayPainter, DEFAULT_FONT_PATH},
    sensors::CameraConfig,
};

/// Largest accepted image upload.
const UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address to serve the browser page on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Video device to capture from
    #[clap(long, default_value = "/dev/video0")]
    device: String,

    /// Capture resolution as WIDTHxHEIGHT, camera maximum if omitted
    #[clap(long, value_parser = parse_resolution)]
    resolution: Option<(u32, u32)>,

    /// Frames per second to request from the camera, camera maximum if omitted
    #[clap(long)]
    fps: Option<u32>,

    /// Minimum confidence for detections
    #[clap(long, default_value_t = 0.5)]
    min_confidence: f32,

    /// Maximum box overlap before suppression
    #[clap(long, default_value_t = 0.5)]
    max_iou: f32,

    /// TTF font for the overlay labels
    #[clap(long, default_value = DEFAULT_FONT_PATH)]
    font: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let detector = SsdMobilenet::new(args.min_confidence, args.max_iou).await?;
    let painter = OverlayPainter::load_or_boxes_only(&args.font);
    let camera = CameraConfig {
        device: args.device,
        resolution: args.resolution,
        frame_rate: args.fps.map(|fps| (1, fps)),
    };

    let session = DetectorSession::new(
        Arc::new(detector),
        painter,
        Arc::new(TerminalBell),
        camera,
    );

    spawn_meter_logger();

    // Build HTTP server with endpoints
    let app = Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/stream", get(annotated_stream))
        .route("/counters", get(counters))
        .route("/status", get(status))
        .route("/start", post(start_live))
        .route("/stop", post(stop_live))
        .route("/upload", post(upload_image))
        .layer(DefaultBodyLimit::max(UPLOAD_LIMIT))
        .layer(Extension(session));

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Serving on http://{addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}

fn parse_resolution(value: &str) -> Result<(u32, u32)> {
    let (width, height) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {value}"))?;

    Ok((width.parse()?, height.parse()?))
}
