//! Newline framing for streamed HTTP bodies

use std::fmt::Display;

use futures::{Stream, StreamExt, stream};

use crate::error::GenerationError;

struct LineState<S> {
    inner: S,
    buf: Vec<u8>,
    done: bool,
}

/// Split a byte stream into lines, without the trailing `\n` / `\r\n`
///
/// A final unterminated line is yielded at end-of-stream. A transport error
/// is yielded once as `StreamInterrupted` and ends the stream.
pub fn lines<S, B, E>(inner: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, E>> + Unpin + Send,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = LineState {
        inner,
        buf: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..line.len() - 1]);
                let text = text.strip_suffix('\r').unwrap_or(&text).to_string();
                return Some((Ok(text), st));
            }

            if st.done {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut st.buf);
                return Some((Ok(String::from_utf8_lossy(&rest).into_owned()), st));
            }

            match st.inner.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    st.buf.clear();
                    return Some((Err(GenerationError::StreamInterrupted(e.to_string())), st));
                }
                None => st.done = true,
            }
        }
    })
}
