//! Operator exit from a live session on a real pseudo-terminal

mod integration;

use nix::pty::openpty;
use nix::sys::termios::{self, LocalFlags};
use std::fs::File;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use integration::{hotplug, logger, teensy, FixedDevices, QueueConnector};
use usb_ser_mon_core::core::state_machine::SessionState;
use usb_ser_mon_core::{
    AutoConnectConfig, ConnectionSupervisor, ExitSignal, OperatorInput, RawModeGuard,
    SessionOptions, Shutdown,
};

#[test]
fn test_exit_restores_terminal() {
    let pty = openpty(None, None).unwrap();
    let before = termios::tcgetattr(&pty.slave).unwrap();
    let mut terminal = File::from(pty.master);

    let connector = QueueConnector::default();
    let mut device = connector.plug();
    let (source, _feed) = hotplug();
    let (logger, display, transcript) = logger();

    let config = AutoConnectConfig {
        session: SessionOptions {
            exit_signal: ExitSignal::control('Y').unwrap(),
            echo: true,
            tx_pace: Duration::ZERO,
            ..SessionOptions::default()
        },
        ..AutoConnectConfig::default()
    };

    {
        let guard = RawModeGuard::acquire(&pty.slave).unwrap();
        let raw = termios::tcgetattr(guard.fd()).unwrap();
        assert!(!raw.local_flags.contains(LocalFlags::ICANON));
        assert!(!raw.local_flags.contains(LocalFlags::ECHO));

        let input = File::from(pty.slave.try_clone().unwrap());
        let mut supervisor = ConnectionSupervisor::new(
            config,
            connector.clone(),
            source,
            OperatorInput::new(input, true),
            logger,
        );
        let runner = thread::spawn(move || {
            let result = supervisor.run(&FixedDevices(vec![teensy("/dev/ttyACM0")]));
            (result, supervisor)
        });

        display.wait_for("Use Control-Y to exit.", 1);

        // Raw mode delivers each key immediately, without waiting for Enter
        terminal.write_all(b"h").unwrap();
        let mut sent = [0u8; 1];
        device.read_exact(&mut sent).unwrap();
        assert_eq!(&sent, b"h");
        assert!(display.text().ends_with("Use Control-Y to exit.\r\nh"));

        // Control-X is just another byte when Control-Y is the exit key
        terminal.write_all(&[0x18, 0x19]).unwrap();
        device.read_exact(&mut sent).unwrap();
        assert_eq!(sent, [0x18]);

        let (result, supervisor) = runner.join().unwrap();
        assert_eq!(result.unwrap(), Shutdown::ExitRequested);
        assert_eq!(
            supervisor.state().path(),
            vec![
                SessionState::Waiting,
                SessionState::Connecting,
                SessionState::Open,
                SessionState::Closing,
                SessionState::Closed,
            ]
        );
    }

    let after = termios::tcgetattr(&pty.slave).unwrap();
    assert_eq!(after.local_flags, before.local_flags);
    assert_eq!(after.input_flags, before.input_flags);
    assert_eq!(after.output_flags, before.output_flags);
    assert_eq!(after.control_chars, before.control_chars);

    // Exit is not a disconnect
    assert!(!display.text().contains("disconnected"));
    assert!(transcript.text().ends_with(": \n"));
}
