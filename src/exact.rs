use std::io;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt};

/// read_full reads from `reader` into `buf` until exactly `len` bytes have
/// been accumulated at the front of `buf`. Each successful partial read
/// stamps `last_activity` (Unix milliseconds) when one is given, so that
/// callers can drive idle timeouts off it
pub async fn read_full<R>(
    reader: &mut R,
    buf: &mut [u8],
    len: usize,
    last_activity: Option<&AtomicI64>,
) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    if len > buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("read of {len} bytes exceeds buffer of {}", buf.len()),
        ));
    }

    let mut filled = 0;
    while filled < len {
        let n = reader.read(&mut buf[filled..len]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream closed after {filled} of {len} bytes"),
            ));
        }

        if let Some(last) = last_activity {
            last.store(now_millis(), Ordering::Relaxed);
        }

        filled += n;
    }

    Ok(())
}

/// now_millis returns the current Unix time in milliseconds
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
