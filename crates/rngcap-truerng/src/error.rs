//! Mapping of serial port errors onto the shared error type

use rngcap_core::Error;
use serialport::ErrorKind;

/// Map a failure while opening `path`
pub(crate) fn open_failed(path: &str, e: serialport::Error) -> Error {
    Error::OpenFailed(format!("{}: {}", path, e))
}

/// Map a failure on an already open port
pub(crate) fn from_serial(e: serialport::Error) -> Error {
    match e.kind() {
        ErrorKind::NoDevice => Error::Disconnected(e.to_string()),
        ErrorKind::Io(kind) => std::io::Error::new(kind, e.description).into(),
        ErrorKind::InvalidInput => Error::InvalidArgument(e.to_string()),
        _ => Error::Io(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_device_is_disconnect() {
        let e = from_serial(serialport::Error::new(ErrorKind::NoDevice, "gone"));
        assert!(e.is_disconnect());
    }

    #[test]
    fn test_io_kind_is_preserved() {
        let e = from_serial(serialport::Error::new(
            ErrorKind::Io(std::io::ErrorKind::BrokenPipe),
            "write failed",
        ));
        assert!(matches!(e, Error::Disconnected(_)));

        let e = from_serial(serialport::Error::new(
            ErrorKind::Io(std::io::ErrorKind::PermissionDenied),
            "denied",
        ));
        assert_eq!(e, Error::Io("denied".into()));
    }

    #[test]
    fn test_open_failed_names_path() {
        let e = open_failed(
            "/dev/ttyACM9",
            serialport::Error::new(ErrorKind::NoDevice, "No such file"),
        );
        assert_eq!(e, Error::OpenFailed("/dev/ttyACM9: No such file".into()));
    }
}
