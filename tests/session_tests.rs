//! # Device Session Tests
//!
//! End-to-end exchanges between a [`DeviceSession`] and the in-memory
//! printer: exact frames on the wire, partial-read assembly, and how the
//! session behaves when the link misbehaves.

use peripage::error::PeripageError;
use peripage::printer::{ConnectionState, DeviceSession, ProfileId};
use peripage::protocol::{Command, DeviceInfo};
use peripage::transport::{MockConnector, MockDevice, MockPrinter};
use pretty_assertions::assert_eq;

fn connected(printer: &MockPrinter, profile: ProfileId) -> DeviceSession<MockConnector> {
    let mut session = DeviceSession::new(printer.connector(), "00:15:83:15:BC:5F", profile);
    session.connect().unwrap();
    session
}

// ============================================================================
// PRINT JOBS
// ============================================================================

#[test]
fn test_text_job_frames() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.reset().unwrap();
    session.set_concentration(1).unwrap();
    session.print_ascii("Hello\nWorld").unwrap();
    assert_eq!(session.current_buffer(), b"World");
    session.flush_ascii().unwrap();
    session.print_break(50).unwrap();

    assert_eq!(
        printer.frames(),
        vec![
            vec![0x10, 0xFF, 0xFE, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            vec![0x10, 0xFF, 0x10, 0x00, 0x01],
            b"Hello\n".to_vec(),
            b"World\n".to_vec(),
            vec![0x1B, 0x4A, 50],
        ]
    );
}

#[test]
fn test_long_line_wraps_at_row_characters() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.print_ascii(&"x".repeat(40)).unwrap();
    session.flush_ascii().unwrap();

    let frames = printer.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], format!("{}\n", "x".repeat(32)).into_bytes());
    assert_eq!(frames[1], format!("{}\n", "x".repeat(8)).into_bytes());
}

#[test]
fn test_blank_line_becomes_paper_feed() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.println_ascii("").unwrap();

    assert_eq!(printer.frames(), vec![Command::PrintBreak(30).encode()]);
}

#[test]
fn test_qr_job_is_reset_then_rows() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    let rows = session.print_qr("https://example.com").unwrap();
    let frames = printer.frames();

    assert!(rows > 0);
    assert_eq!(frames.len(), rows + 1);
    assert_eq!(frames[0], Command::Reset.encode());
    for frame in &frames[1..] {
        assert_eq!(&frame[..8], &[0x1D, 0x76, 0x30, 0x00, 48, 0x00, 0x01, 0x00]);
        assert_eq!(frame.len(), 8 + 48);
    }
}

#[test]
fn test_raster_job_between_text_keeps_partial_line() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.print_ascii("abc").unwrap();
    session.print_rows([[0u8; 48]]).unwrap();
    session.flush_ascii().unwrap();

    assert_eq!(
        printer.frames(),
        vec![
            Command::Reset.encode(),
            Command::PrintRow(vec![0u8; 48]).encode(),
            b"abc\n".to_vec(),
        ]
    );
}

#[test]
fn test_wide_profile_rows() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A40p);

    let row = vec![0xAA; 231];
    session.print_rows([&row, &row]).unwrap();

    let frames = printer.frames();
    assert_eq!(frames.len(), 3);
    // 231 = 0x00E7, little-endian
    assert_eq!(&frames[1][4..6], &[0xE7, 0x00]);
}

// ============================================================================
// QUERIES
// ============================================================================

#[test]
fn test_queries_survive_one_byte_reads() {
    let device = MockDevice::default();
    let printer = MockPrinter::with_device(device.clone());
    printer.set_read_chunk(1);
    let mut session = connected(&printer, ProfileId::A6p);

    assert_eq!(session.device_name().unwrap(), device.name);
    assert_eq!(session.device_mac().unwrap(), device.mac);
    assert_eq!(session.device_battery().unwrap(), device.battery);

    let expected: DeviceInfo = device.full().parse().unwrap();
    assert_eq!(session.device_info().unwrap(), expected);
}

#[test]
fn test_padded_answer_in_small_reads_keeps_queries_aligned() {
    let printer = MockPrinter::new();
    printer.set_read_chunk(3);
    let mut session = connected(&printer, ProfileId::A6);

    printer.answer_next(b"V2.11\0\0");
    assert_eq!(session.device_firmware().unwrap(), "V2.11");
    assert_eq!(session.device_battery().unwrap(), 84);

    printer.answer_next(b"PeriPage+DF7A\r\n\0");
    assert_eq!(session.device_name().unwrap(), "PeriPage+DF7A");
    assert_eq!(session.device_mac().unwrap(), printer.device().mac);
}

#[test]
fn test_serial_number_round_trip() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.set_device_serial_number("PP-2024-0042").unwrap();

    assert_eq!(session.device_serial().unwrap(), "PP-2024-0042");
    assert_eq!(printer.device().serial, "PP-2024-0042");
    assert_eq!(
        printer.frames()[0],
        [&[0x10, 0xFF, 0x20, 0xF4][..], b"PP-2024-0042", &[0x00]].concat()
    );
}

#[test]
fn test_invalid_arguments_never_touch_the_wire() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    for result in [
        session.set_concentration(3),
        session.set_power_timeout(0),
        session.set_power_timeout(0xFFF1),
        session.set_device_serial_number(""),
        session.set_device_serial_number("has|pipe"),
        session.set_device_serial_number(&"s".repeat(33)),
        session.send_row(&[0u8; 47]),
    ] {
        assert!(matches!(result, Err(PeripageError::Validation(_))), "{:?}", result);
    }

    assert!(printer.frames().is_empty());
    assert_eq!(session.state(), ConnectionState::Connected);
}

// ============================================================================
// LINK FAILURES
// ============================================================================

#[test]
fn test_operations_require_a_connection() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    session.disconnect();
    session.disconnect();

    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(matches!(
        session.device_battery(),
        Err(PeripageError::Connection(_))
    ));
    assert!(printer.frames().is_empty());
}

#[test]
fn test_dropped_link_fails_then_reconnects() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);

    printer.drop_link();
    let err = session.device_battery().unwrap_err();
    assert!(err.is_link_failure());
    assert_eq!(session.state(), ConnectionState::Failed);

    session.reconnect().unwrap();
    assert_eq!(session.device_battery().unwrap(), 84);
    assert_eq!(printer.connects(), 2);
}

#[test]
fn test_silent_printer_times_out() {
    let printer = MockPrinter::new();
    let mut session = connected(&printer, ProfileId::A6);
    printer.set_silent(true);

    assert!(matches!(
        session.device_battery(),
        Err(PeripageError::Timeout(_))
    ));
}

#[test]
fn test_refused_connect_is_connection_error() {
    let printer = MockPrinter::new();
    printer.refuse_connects(1);
    let mut session = DeviceSession::new(printer.connector(), "00:15:83:15:BC:5F", ProfileId::A6);

    assert!(matches!(session.connect(), Err(PeripageError::Connection(_))));
    assert_eq!(session.state(), ConnectionState::Failed);

    session.connect().unwrap();
    assert_eq!(printer.last_address().as_deref(), Some("00:15:83:15:BC:5F"));
}
