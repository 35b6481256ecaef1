use crate::config::MAX_LINE_LEN;
use log::{debug, warn};
use std::io::{self, BufRead, BufReader, Read};
use std::thread::{self, JoinHandle};

/// Spawns a background thread that splits `reader` into lines.
///
/// Each line is passed to `on_line` with its `\n` and a trailing `\r`
/// removed; invalid UTF-8 is replaced. The thread runs until the stream ends
/// or fails, or a line exceeds [`MAX_LINE_LEN`] bytes.
pub fn spawn_line_reader<R, F>(reader: R, mut on_line: F) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
    F: FnMut(&str) + Send + 'static,
{
    thread::spawn(move || {
        let result = read_lines(reader, &mut on_line);
        match &result {
            Ok(()) => debug!("line reader reached end of stream"),
            Err(err) if err.kind() == io::ErrorKind::InvalidData => warn!("line reader stopped: {err}"),
            // A closed PTY reads as EIO on Linux; that is the usual way out.
            Err(err) => debug!("line reader stopped: {err}"),
        }
        result
    })
}

pub(crate) fn read_lines<R: Read>(reader: R, on_line: &mut dyn FnMut(&str)) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader
            .by_ref()
            // Room for a full-length line plus its `\r\n`.
            .take(MAX_LINE_LEN as u64 + 2)
            .read_until(b'\n', &mut line)?;
        if n == 0 {
            return Ok(());
        }

        let mut end = line.len();
        if line[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        if end > MAX_LINE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("output line longer than {MAX_LINE_LEN} bytes"),
            ));
        }

        on_line(&String::from_utf8_lossy(&line[..end]));
    }
}
