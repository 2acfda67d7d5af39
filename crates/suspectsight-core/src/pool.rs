//! Fixed-size pool of analyzer worker threads.
//!
//! Model inference is blocking and each ONNX session is used from one thread
//! at a time, so every worker owns its own analyzer. Async callers submit jobs
//! over a bounded channel and await a one-shot reply; excess jobs queue.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::annotate::{FontError, LabelFont};
use crate::gallery::Gallery;
use crate::recognize::{self, Recognition, RecognizeError};
use crate::types::{Encoding, MatchSettings};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Jobs that may wait in the queue per worker before submitters start waiting.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error("failed to start analyzer: {0}")]
    Startup(#[from] AnalyzerError),
    #[error("failed to load label font: {0}")]
    Font(#[from] FontError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pool needs at least one worker")]
    NoWorkers,
    #[error("analyzer workers exited")]
    ChannelClosed,
}

/// Messages sent from async handlers to the worker threads.
enum PoolRequest {
    EncodeFirst {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Option<Encoding>, RecognizeError>>,
    },
    Recognize {
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        settings: MatchSettings,
        reply: oneshot::Sender<Result<Recognition, RecognizeError>>,
    },
}

/// Clone-safe handle to the worker threads.
#[derive(Clone)]
pub struct AnalyzerPool {
    tx: mpsc::Sender<PoolRequest>,
    workers: usize,
}

impl AnalyzerPool {
    /// Build one analyzer per worker on the calling thread (so a missing model
    /// fails startup), then move each onto its own named OS thread.
    ///
    /// Labels are drawn with `font`, or with the bundled font when it is `None`.
    pub fn spawn<A, F>(workers: usize, font: Option<LabelFont>, make_analyzer: F) -> Result<Self, PoolError>
    where
        A: FaceAnalyzer + Send + 'static,
        F: Fn(usize) -> Result<A, AnalyzerError>,
    {
        if workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let analyzers = (0..workers).map(&make_analyzer).collect::<Result<Vec<A>, _>>()?;

        let (tx, rx) = mpsc::channel::<PoolRequest>(workers * QUEUE_DEPTH_PER_WORKER);
        let rx = Arc::new(Mutex::new(rx));
        let font = match font {
            Some(font) => font,
            None => LabelFont::bundled()?,
        };

        for (index, analyzer) in analyzers.into_iter().enumerate() {
            let rx = Arc::clone(&rx);
            let font = font.clone();
            std::thread::Builder::new()
                .name(format!("suspectsight-worker-{index}"))
                .spawn(move || worker_loop(index, analyzer, &rx, &font))
                .map_err(PoolError::Spawn)?;
        }

        tracing::info!(workers, "analyzer pool started");
        Ok(Self { tx, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Encoding of the most confident face in an image, `None` if it has no face.
    pub async fn encode_first(&self, image: Vec<u8>) -> Result<Option<Encoding>, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.submit(PoolRequest::EncodeFirst { image, reply }).await?;
        Ok(rx.await.map_err(|_| PoolError::ChannelClosed)??)
    }

    /// Label every face of an image against `gallery` and return the annotated JPEG.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        settings: MatchSettings,
    ) -> Result<Recognition, PoolError> {
        let (reply, rx) = oneshot::channel();
        self.submit(PoolRequest::Recognize {
            image,
            gallery,
            settings,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| PoolError::ChannelClosed)??)
    }

    async fn submit(&self, request: PoolRequest) -> Result<(), PoolError> {
        self.tx.send(request).await.map_err(|_| PoolError::ChannelClosed)
    }
}

fn worker_loop<A: FaceAnalyzer>(
    index: usize,
    mut analyzer: A,
    rx: &Mutex<mpsc::Receiver<PoolRequest>>,
    font: &LabelFont,
) {
    tracing::debug!(worker = index, "analyzer worker started");
    loop {
        // Only the receive happens under the lock; the job itself runs unlocked.
        let next = match rx.lock() {
            Ok(mut guard) => guard.blocking_recv(),
            Err(poisoned) => poisoned.into_inner().blocking_recv(),
        };
        let Some(request) = next else {
            break;
        };

        match request {
            PoolRequest::EncodeFirst { image, reply } => {
                let _ = reply.send(recognize::encode_first(&mut analyzer, &image));
            }
            PoolRequest::Recognize {
                image,
                gallery,
                settings,
                reply,
            } => {
                let result = recognize::recognize(&mut analyzer, &image, &gallery, settings, font);
                if let Err(e) = &result {
                    tracing::debug!(worker = index, error = %e, "recognition failed");
                }
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!(worker = index, "analyzer worker exiting");
}
