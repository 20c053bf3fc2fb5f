//! Run a pretrained cat/dog detector on a webcam stream or uploaded images
//! and watch the annotated frames in the browser.

pub mod controller;
pub mod endpoints;
pub mod meter;
pub mod nn;
pub mod notify;
pub mod overlay;
pub mod sensors;
pub mod status;
pub mod utils;

use bytes::Bytes;
use tokio::sync::broadcast;

pub type FrameSender = broadcast::Sender<Bytes>;
pub type FrameReceiver = broadcast::Receiver<Bytes>;

/// Capacity of the annotated-frame fanout channel.
const FRAME_CHANNEL_CAPACITY: usize = 16;

pub fn frame_channel() -> (FrameSender, FrameReceiver) {
    broadcast::channel(FRAME_CHANNEL_CAPACITY)
}

/// Wrap an encoded JPEG as one item of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
