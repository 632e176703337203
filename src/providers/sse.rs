//! Shared SSE line-framing helper. OpenAI-, Anthropic-, and Google-style
//! APIs all speak `data: <json>\n\n` server-sent events; only the JSON
//! shape inside each event differs, which each provider module decodes for
//! itself.

use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Response;
use std::collections::VecDeque;

use crate::error::{Error, Result};

struct FrameState {
    byte_stream: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buf: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Splits a streamed HTTP response into individual `data:` payload strings,
/// dropping the terminal `[DONE]` sentinel and blank keep-alive lines.
pub fn data_frames(response: Response) -> BoxStream<'static, Result<String>> {
    let state = FrameState {
        byte_stream: response.bytes_stream().boxed(),
        buf: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.done {
                return None;
            }

            match state.byte_stream.next().await {
                Some(Ok(chunk)) => {
                    state.buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = state.buf.find('\n') {
                        let line = state.buf[..pos].trim_end_matches('\r').to_string();
                        state.buf.drain(..=pos);
                        let Some(payload) = line.strip_prefix("data:") else { continue };
                        let payload = payload.trim();
                        if payload.is_empty() || payload == "[DONE]" {
                            continue;
                        }
                        state.pending.push_back(payload.to_string());
                    }
                }
                Some(Err(err)) => {
                    state.done = true;
                    return Some((Err(Error::Http(err)), state));
                }
                None => {
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}
