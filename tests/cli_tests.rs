#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alsamidi::cli::*;
    use alsamidi::router::{EventKind, PortCaps};
    use alsamidi::*;
    use clap::Parser;
    use indicatif::ProgressBar;

    fn populated() -> MockRouter {
        let router = MockRouter::with_system();
        let keys = router.add_client("Keystation");
        router.add_port(keys, "Keystation MIDI 1", PortCaps::READ | PortCaps::SUBS_READ);
        let synth = router.add_client("Synth");
        router.add_port(synth, "Synth MIDI 1", PortCaps::WRITE | PortCaps::SUBS_WRITE);
        router
    }

    fn output(buffer: Vec<u8>) -> String {
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_args_send() {
        let args = Args::parse_from(["alsamidi", "send", "20:0", "90", "0x40", "7f"]);
        assert_eq!(
            args.command,
            Command::Send {
                addr: Addr::new(20, 0),
                bytes: vec![0x90, 0x40, 0x7F],
            }
        );
        assert_eq!(args.config, None);
    }

    #[test]
    fn test_args_monitor() {
        let args = Args::parse_from(["alsamidi", "monitor", "-n", "3", "--config", "midi.toml"]);
        assert_eq!(
            args.command,
            Command::Monitor {
                addr: None,
                count: Some(3),
            }
        );
        assert_eq!(args.config, Some("midi.toml".into()));
    }

    #[test]
    fn test_args_reject_bad_input() {
        assert!(Args::try_parse_from(["alsamidi", "probe", "20"]).is_err());
        assert!(Args::try_parse_from(["alsamidi", "send", "20:0"]).is_err());
        assert!(Args::try_parse_from(["alsamidi", "send", "20:0", "zz"]).is_err());
    }

    #[test]
    fn test_list_user_devices() {
        let router = populated();
        let mut out = Vec::new();

        let listed = run_list(&router, false, &mut out).unwrap();
        assert_eq!(listed, 2);

        let text = output(out);
        assert!(text.starts_with("Available MIDI devices:\n"));
        assert!(text.contains("20:0  in      Keystation MIDI 1"));
        assert!(text.contains("21:0  out     Synth MIDI 1"));
        assert!(!text.contains("Midi Through"));
    }

    #[test]
    fn test_list_all_devices() {
        let router = populated();
        let mut out = Vec::new();

        assert_eq!(run_list(&router, true, &mut out).unwrap(), 5);
        let text = output(out);
        assert!(text.contains("Timer"));
        assert!(text.contains("14:0  in/out  Midi Through Port-0"));
    }

    #[test]
    fn test_list_nothing() {
        let router = MockRouter::with_system();
        let mut out = Vec::new();

        assert_eq!(run_list(&router, false, &mut out).unwrap(), 0);
        assert_eq!(output(out), "No MIDI devices found\n");
    }

    #[test]
    fn test_probe_prints_capabilities() {
        let router = populated();
        let mut out = Vec::new();

        run_probe(&router, Addr::new(21, 0), &mut out).unwrap();
        assert_eq!(output(out), "21:0: input=false output=true\n");
    }

    #[test]
    fn test_send_reaches_device() {
        let router = populated();
        let synth = Addr::new(21, 0);
        let mut out = Vec::new();

        run_send(&router, synth, &[0x90, 0x40, 0x7F], "alsamidi", &mut out).unwrap();

        assert_eq!(output(out), "Sent 90 40 7F to Synth MIDI 1 (21:0)\n");
        let received = router.take_received(synth);
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0].kind,
            EventKind::NoteOn {
                channel: 0,
                note: 0x40,
                velocity: 0x7F,
            }
        );
        assert_eq!(router.queue_count(), 0);
    }

    #[test]
    fn test_send_to_missing_device() {
        let router = populated();
        let mut out = Vec::new();

        let err = run_send(&router, Addr::new(99, 0), &[0xF8], "alsamidi", &mut out).unwrap_err();
        assert!(matches!(err, CliError::NotFound(addr) if addr == Addr::new(99, 0)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_send_to_input_only_device() {
        let router = populated();
        let mut out = Vec::new();

        let err = run_send(&router, Addr::new(20, 0), &[0xF8], "alsamidi", &mut out).unwrap_err();
        assert!(matches!(
            err,
            CliError::Device(DeviceError::NotOutput { .. })
        ));
    }

    #[test]
    fn test_monitor_prints_received_messages() {
        let router = populated();
        let keys = Addr::new(20, 0);
        let mut device = find_device(&router, keys).unwrap();
        device.connect().unwrap();

        let note = EventKind::NoteOn {
            channel: 0,
            note: 0x3C,
            velocity: 0x64,
        };
        router.inject(keys, note.clone());
        router.inject(keys, note);

        let mut out = Vec::new();
        let received = run_monitor(
            &mut device,
            Some(2),
            Duration::from_millis(1),
            &mut out,
            &ProgressBar::hidden(),
        )
        .unwrap();

        assert_eq!(received, 2);
        let text = output(out);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|line| line.ends_with("90 3C 64")));
        assert!(!device.is_connected());
    }

    #[test]
    fn test_find_device_carries_name() {
        let router = populated();
        let device = find_device(&router, Addr::new(20, 0)).unwrap();
        assert_eq!(device.name(), Some("Keystation MIDI 1"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x90, 0x40, 0x7F]), "90 40 7F");
        assert_eq!(format_bytes(&[]), "");
    }
}
