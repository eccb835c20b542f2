//! Word-level re-chunking for backends that return complete text.
//!
//! Backends that cannot stream natively split their reply into word
//! chunks and emit them with small pacing delays, so consumers see the
//! same incremental-delivery contract as a genuinely streaming backend.
//! Joining the chunks always reproduces the original text exactly.

use std::time::Duration;

use futures::stream::{self, StreamExt};

use aether_core::{AgentReply, ProviderEvent, ProviderStream};

/// Pacing between successive chunks.
#[derive(Clone, Copy, Debug)]
pub enum ChunkDelay {
    /// Emit chunks back to back. Used in tests.
    None,
    Fixed(Duration),
    /// `base` plus a uniformly random fraction of `spread` per chunk.
    Jittered { base: Duration, spread: Duration },
}

impl ChunkDelay {
    fn next(self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => d,
            Self::Jittered { base, spread } => base + spread.mul_f64(rand::random::<f64>()),
        }
    }
}

/// Split text into chunks that join back to the original. Every chunk
/// after the first carries its separating space.
pub fn word_chunks(text: &str) -> Vec<String> {
    text.split(' ')
        .enumerate()
        .map(|(i, word)| {
            if i == 0 {
                word.to_string()
            } else {
                format!(" {word}")
            }
        })
        .collect()
}

/// Turn a complete reply into a paced chunk stream ending in `Done`.
/// Empty content produces no chunks, only the terminal event.
pub fn stream_words(reply: AgentReply, delay: ChunkDelay) -> ProviderStream {
    let mut events: Vec<ProviderEvent> = Vec::new();
    if !reply.content.is_empty() {
        for text in word_chunks(&reply.content) {
            events.push(ProviderEvent::Chunk { text });
        }
    }
    events.push(ProviderEvent::Done { reply });

    Box::pin(stream::iter(events).then(move |event| async move {
        let pause = match &event {
            ProviderEvent::Chunk { .. } => delay.next(),
            ProviderEvent::Done { .. } => Duration::ZERO,
        };
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        event
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::AgentId;

    fn reply(content: &str) -> AgentReply {
        AgentReply {
            agent_id: AgentId::Writer,
            content: content.to_string(),
            sources: None,
        }
    }

    #[test]
    fn chunks_join_back_to_original() {
        for text in [
            "hello world",
            "one",
            "double  space",
            "line\nbreak inside words",
            "trailing space ",
        ] {
            let joined: String = word_chunks(text).concat();
            assert_eq!(joined, text, "round trip failed for {text:?}");
        }
    }

    #[test]
    fn first_chunk_has_no_leading_space() {
        let chunks = word_chunks("a b c");
        assert_eq!(chunks, vec!["a", " b", " c"]);
    }

    #[tokio::test]
    async fn stream_ends_with_done_carrying_full_content() {
        let mut stream = stream_words(reply("alpha beta gamma"), ChunkDelay::None);

        let mut streamed = String::new();
        let mut done_content = None;
        while let Some(event) = stream.next().await {
            match event {
                ProviderEvent::Chunk { text } => streamed.push_str(&text),
                ProviderEvent::Done { reply } => done_content = Some(reply.content),
            }
        }

        assert_eq!(streamed, "alpha beta gamma");
        assert_eq!(done_content.as_deref(), Some("alpha beta gamma"));
    }

    #[tokio::test]
    async fn empty_content_yields_only_done() {
        let events: Vec<_> = stream_words(reply(""), ChunkDelay::None).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_done());
    }

    #[tokio::test]
    async fn paced_stream_delivers_everything() {
        tokio::time::pause();

        let events: Vec<_> = stream_words(
            reply("a b c"),
            ChunkDelay::Jittered {
                base: Duration::from_millis(15),
                spread: Duration::from_millis(25),
            },
        )
        .collect()
        .await;

        assert_eq!(events.len(), 4);
        assert!(events.last().is_some_and(ProviderEvent::is_done));
    }
}
