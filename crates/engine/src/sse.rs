//! Minimal server-sent-events buffering for the llama-server stream.
//!
//! Events are `\n\n`-delimited blocks; only `data:` lines matter here.

/// Pull complete `data:` payloads out of `buffer`, leaving any trailing
/// partial event in place for the next chunk.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();

    while let Some(end) = buffer.find("\n\n") {
        let event: String = buffer.drain(..end + 2).collect();
        for line in event.lines() {
            if let Some(data) = line.trim().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_owned());
                }
            }
        }
    }

    payloads
}
