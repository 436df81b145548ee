use super::StreamMode;

/// Which parent stream a completed line is echoed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Channel {
    Stdout,
    Stderr,
}

impl Channel {
    pub(super) fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Accumulate a raw chunk into a byte line buffer, flushing complete lines.
///
/// Lines are decoded only once complete so multi-byte UTF-8 sequences split
/// across reads stay intact. Each complete line (including `\n`) is appended
/// to `output` and echoed according to `channel` and `stream_mode`.
pub(super) fn accumulate_and_flush_lines(
    chunk: &[u8],
    line_buf: &mut Vec<u8>,
    output: &mut String,
    channel: Channel,
    stream_mode: StreamMode,
) {
    line_buf.extend_from_slice(chunk);
    while let Some(newline_pos) = line_buf.iter().position(|b| *b == b'\n') {
        let raw: Vec<u8> = line_buf.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw);
        echo_line(&line, channel, stream_mode);
        output.push_str(&line);
    }
}

/// Flush any remaining partial line on EOF.
pub(super) fn flush_line_buf(
    line_buf: &mut Vec<u8>,
    output: &mut String,
    channel: Channel,
    stream_mode: StreamMode,
) {
    if !line_buf.is_empty() {
        let line = String::from_utf8_lossy(line_buf).into_owned();
        echo_line(&line, channel, stream_mode);
        output.push_str(&line);
        line_buf.clear();
    }
}

fn echo_line(line: &str, channel: Channel, stream_mode: StreamMode) {
    match channel {
        // Stderr always reaches the parent, matching an inherited stream.
        Channel::Stderr => eprint!("{line}"),
        Channel::Stdout if stream_mode == StreamMode::EchoStdout => println!("{}", line.trim()),
        Channel::Stdout => {}
    }
}

/// Extract summary from output (last non-empty line, truncated to 200 chars).
pub(super) fn extract_summary(output: &str) -> String {
    truncate_line(last_non_empty_line(output), 200)
}

/// Build summary for failed executions (exit_code != 0).
///
/// Priority chain:
/// 1. stdout last non-empty line
/// 2. stderr last non-empty line
/// 3. `"exit code {N}"` when both streams are empty
pub(super) fn failure_summary(stdout: &str, stderr: &str, exit_code: i32) -> String {
    let stdout_line = last_non_empty_line(stdout);
    if !stdout_line.is_empty() {
        return truncate_line(stdout_line, 200);
    }

    let stderr_line = last_non_empty_line(stderr);
    if !stderr_line.is_empty() {
        return truncate_line(stderr_line, 200);
    }

    format!("exit code {exit_code}")
}

/// Return the last non-empty line from the given text, or `""` if none.
pub(super) fn last_non_empty_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

/// Truncate a line to `max_chars` characters, appending "..." if truncated.
pub(super) fn truncate_line(line: &str, max_chars: usize) -> String {
    if line.chars().nth(max_chars).is_none() {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(max_chars - 3).collect();
        format!("{truncated}...")
    }
}
