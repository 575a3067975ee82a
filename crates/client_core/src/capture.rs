//! Barcode capture sources.
//!
//! A source is started with [`CaptureOptions`] and hands back a [`ScanFeed`],
//! a single-consumer stream of decoded strings. Stopping the source ends the
//! feed; starting it again first stops the previous session.

use std::{marker::PhantomData, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

const FEED_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    Environment,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeFormat {
    QrCode,
    Ean13,
    Ean8,
    Code128,
    Code39,
    UpcA,
    UpcE,
}

pub const SUPPORTED_FORMATS: [BarcodeFormat; 7] = [
    BarcodeFormat::QrCode,
    BarcodeFormat::Ean13,
    BarcodeFormat::Ean8,
    BarcodeFormat::Code128,
    BarcodeFormat::Code39,
    BarcodeFormat::UpcA,
    BarcodeFormat::UpcE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub facing_mode: FacingMode,
    pub formats: Vec<BarcodeFormat>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            formats: SUPPORTED_FORMATS.to_vec(),
        }
    }
}

pub type ScanFeed = ReceiverStream<String>;

#[async_trait]
pub trait BarcodeSource: Send {
    async fn start(&mut self, options: CaptureOptions) -> Result<ScanFeed>;
    async fn stop(&mut self) -> Result<()>;
    fn is_active(&self) -> bool;
}

/// Source fed by hand: manual entry, demo barcodes, tests.
#[derive(Default)]
pub struct ChannelBarcodeSource {
    sender: Arc<Mutex<Option<mpsc::Sender<String>>>>,
    active: bool,
}

/// Cloneable handle pushing codes into the active [`ChannelBarcodeSource`].
#[derive(Clone)]
pub struct BarcodeInjector {
    sender: Arc<Mutex<Option<mpsc::Sender<String>>>>,
}

impl ChannelBarcodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn injector(&self) -> BarcodeInjector {
        BarcodeInjector {
            sender: self.sender.clone(),
        }
    }
}

impl BarcodeInjector {
    /// Delivers `code` to the feed. Returns `false` when no capture session
    /// is active or the consumer has gone away.
    pub async fn push(&self, code: impl Into<String>) -> bool {
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => sender.send(code.into()).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl BarcodeSource for ChannelBarcodeSource {
    async fn start(&mut self, options: CaptureOptions) -> Result<ScanFeed> {
        if self.active {
            self.stop().await?;
        }
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        *self.sender.lock().await = Some(tx);
        self.active = true;
        info!(formats = options.formats.len(), "capture: manual entry started");
        Ok(ReceiverStream::new(rx))
    }

    async fn stop(&mut self) -> Result<()> {
        self.sender.lock().await.take();
        if self.active {
            info!("capture: manual entry stopped");
        }
        self.active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// Reads one code per line from an async reader: stdin, a keyboard-wedge
/// scanner, a file. Blank lines are skipped.
pub struct LineBarcodeSource<R, F> {
    open_reader: F,
    reader_task: Option<JoinHandle<()>>,
    _reader: PhantomData<fn() -> R>,
}

impl<R, F> LineBarcodeSource<R, F>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    F: FnMut() -> R + Send,
{
    pub fn new(open_reader: F) -> Self {
        Self {
            open_reader,
            reader_task: None,
            _reader: PhantomData,
        }
    }
}

#[async_trait]
impl<R, F> BarcodeSource for LineBarcodeSource<R, F>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    F: FnMut() -> R + Send,
{
    async fn start(&mut self, options: CaptureOptions) -> Result<ScanFeed> {
        self.stop().await?;
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let mut lines = (self.open_reader)().lines();
        self.reader_task = Some(tokio::spawn(async move {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let code = line.trim();
                        if code.is_empty() {
                            continue;
                        }
                        if tx.send(code.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "capture: reader failed");
                        break;
                    }
                }
            }
        }));
        info!(
            facing_mode = ?options.facing_mode,
            "capture: line reader started"
        );
        Ok(ReceiverStream::new(rx))
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
            info!("capture: line reader stopped");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.reader_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn channel_source_delivers_until_stopped() {
        let mut source = ChannelBarcodeSource::new();
        let injector = source.injector();
        assert!(!injector.push("ignored").await);

        let mut feed = source
            .start(CaptureOptions::default())
            .await
            .expect("start");
        assert!(source.is_active());
        assert!(injector.push("123456789012").await);
        assert_eq!(feed.next().await.as_deref(), Some("123456789012"));

        source.stop().await.expect("stop");
        assert!(!source.is_active());
        assert!(!injector.push("after-stop").await);
        assert_eq!(feed.next().await, None);
    }

    #[tokio::test]
    async fn restarting_ends_previous_feed() {
        let mut source = ChannelBarcodeSource::new();
        let mut first = source
            .start(CaptureOptions::default())
            .await
            .expect("start");
        let mut second = source
            .start(CaptureOptions::default())
            .await
            .expect("restart");

        assert_eq!(first.next().await, None);
        assert!(source.injector().push("42").await);
        assert_eq!(second.next().await.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn line_source_trims_and_skips_blank_lines() {
        let mut source = LineBarcodeSource::new(|| b"123\n\n  456  \n".as_slice());
        let feed = source
            .start(CaptureOptions::default())
            .await
            .expect("start");
        let codes: Vec<String> = feed.collect().await;
        assert_eq!(codes, vec!["123".to_string(), "456".to_string()]);
    }

    #[test]
    fn default_options_match_supported_formats() {
        let options = CaptureOptions::default();
        assert_eq!(options.facing_mode, FacingMode::Environment);
        assert_eq!(options.formats.len(), SUPPORTED_FORMATS.len());
    }
}
