use std::io;

use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Open a serial device at `baud`, 8N1, no flow control.
pub(super) fn open(path: &str, baud: u32) -> io::Result<SerialStream> {
    tokio_serial::new(path, baud)
        .open_native_async()
        .map_err(io::Error::from)
}
