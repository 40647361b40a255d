//! Drives a token stream through segmentation into the speech sink

use futures::StreamExt;
use tokio::sync::mpsc;

use super::{Sentence, SentenceSegmenter, SpeechSynthesisSink, Transcript};
use crate::error::GenerationError;
use crate::llm::TokenStream;

/// What one response produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSummary {
    /// Full generated text
    pub text: String,

    /// Sentences handed to the sink
    pub sentences: usize,

    /// Sentences that failed to synthesize or play
    pub playback_failures: usize,
}

/// Speaks a streamed response sentence by sentence
///
/// Reading and speaking run as two stages joined by a bounded queue. The
/// reader blocks when the queue is full; the speaker awaits each sentence
/// before taking the next.
#[derive(Debug, Clone)]
pub struct ResponseStreamConsumer {
    sink: SpeechSynthesisSink,
    segmenter: SentenceSegmenter,
    queue_capacity: usize,
    transcript: Transcript,
}

impl ResponseStreamConsumer {
    /// `segmenter` is used as a template; each response gets a fresh copy
    #[must_use]
    pub fn new(sink: SpeechSynthesisSink, segmenter: SentenceSegmenter, queue_capacity: usize) -> Self {
        Self {
            sink,
            segmenter,
            queue_capacity: queue_capacity.max(1),
            transcript: Transcript::stdout(),
        }
    }

    #[must_use]
    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    #[must_use]
    pub const fn sink(&self) -> &SpeechSynthesisSink {
        &self.sink
    }

    /// Consume one response stream to the end
    ///
    /// Playback failures are logged and skipped. If the stream fails,
    /// sentences already completed are still spoken, the unfinished tail is
    /// discarded and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the `GenerationError` that ended the stream early
    pub async fn consume(&self, tokens: TokenStream) -> Result<ResponseSummary, GenerationError> {
        let (tx, rx) = mpsc::channel::<Sentence>(self.queue_capacity);
        let mut segmenter = self.segmenter.clone();
        segmenter.clear();

        self.transcript.assistant_begin();
        let (read, (spoken, failed)) = tokio::join!(
            self.read(tokens, &mut segmenter, tx),
            self.speak_all(rx)
        );
        self.transcript.assistant_end();

        let (text, result) = read;
        match result {
            Ok(()) => {
                tracing::debug!(sentences = spoken + failed, failed, "response complete");
                Ok(ResponseSummary {
                    text,
                    sentences: spoken + failed,
                    playback_failures: failed,
                })
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    spoken,
                    discarded = segmenter.pending().len(),
                    "response stream failed"
                );
                Err(e)
            }
        }
    }

    /// Reader stage: pull tokens, segment, enqueue
    async fn read(
        &self,
        mut tokens: TokenStream,
        segmenter: &mut SentenceSegmenter,
        tx: mpsc::Sender<Sentence>,
    ) -> (String, Result<(), GenerationError>) {
        let mut text = String::new();

        while let Some(item) = tokens.next().await {
            let token = match item {
                Ok(token) => token,
                Err(e) => return (text, Err(e)),
            };

            self.transcript.token(&token);
            text.push_str(&token);

            for sentence in segmenter.feed(&token) {
                tracing::trace!(sentence = %sentence, "sentence queued");
                if tx.send(sentence).await.is_err() {
                    tracing::trace!("speaker stage gone, reader stopping");
                    return (text, Ok(()));
                }
            }
        }

        if let Some(rest) = segmenter.flush()
            && let Err(lost) = tx.send(rest).await
        {
            tracing::trace!(sentence = %lost.0, "speaker stage gone, final sentence dropped");
        }
        (text, Ok(()))
    }

    /// Speaker stage: strictly one sentence at a time, in queue order
    async fn speak_all(&self, mut rx: mpsc::Receiver<Sentence>) -> (usize, usize) {
        let mut spoken = 0;
        let mut failed = 0;

        while let Some(sentence) = rx.recv().await {
            match self.sink.speak(&sentence).await {
                Ok(()) => spoken += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = %e, sentence = %sentence, "skipping sentence");
                }
            }
        }

        (spoken, failed)
    }
}
