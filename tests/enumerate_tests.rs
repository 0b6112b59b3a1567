#[cfg(test)]
mod tests {
    use alsamidi::router::mock::Fault;
    use alsamidi::router::{Addr, PortCaps};
    use alsamidi::*;

    fn populated() -> MockRouter {
        let router = MockRouter::with_system();
        let keys = router.add_client("Keystation");
        router.add_port(keys, "Keystation MIDI 1", PortCaps::READ | PortCaps::SUBS_READ);
        let synth = router.add_client("Synth");
        router.add_port(synth, "Synth MIDI 1", PortCaps::WRITE | PortCaps::SUBS_WRITE);
        router
    }

    #[test]
    fn test_no_clients_is_empty_success() {
        let router = MockRouter::new();
        let devices = get_devices(&router).unwrap();
        assert!(devices.is_empty());
    }

    #[test]
    fn test_lists_every_port_in_order() {
        let router = populated();
        let devices = get_devices(&router).unwrap();

        let addrs: Vec<Addr> = devices.iter().map(|d| d.addr()).collect();
        assert_eq!(
            addrs,
            vec![
                Addr::new(0, 0),
                Addr::new(0, 1),
                Addr::new(14, 0),
                Addr::new(20, 0),
                Addr::new(21, 0)
            ]
        );

        let keys = &devices[3];
        assert_eq!(keys.name(), Some("Keystation MIDI 1"));
        assert_eq!(keys.state(), DeviceState::Probed);
        assert!(keys.is_input());
        assert!(!keys.is_output());
        assert!(!keys.is_connected());

        let synth = &devices[4];
        assert!(!synth.is_input());
        assert!(synth.is_output());
    }

    #[test]
    fn test_session_is_closed_afterwards() {
        let router = populated();
        get_devices(&router).unwrap();
        let stats = router.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.closes, 1);
    }

    #[test]
    fn test_user_devices_skip_system_ports() {
        let router = populated();
        let names: Vec<String> = get_user_devices(&router)
            .unwrap()
            .iter()
            .filter_map(|d| d.name().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["Keystation MIDI 1", "Synth MIDI 1"]);
    }

    #[test]
    fn test_failure_before_first_device() {
        let router = populated();
        router.fail_queries_after(0);

        let err = get_devices(&router).unwrap_err();
        assert!(matches!(err, DeviceError::Enumerate(_)));
        assert!(err.to_string().starts_with("Failed to get client/port info"));
        assert_eq!(router.stats().opens, router.stats().closes);
    }

    #[test]
    fn test_failure_after_some_devices_returns_them() {
        let router = populated();
        // first client, its first port, then the walk fails
        router.fail_queries_after(2);

        let devices = get_devices(&router).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), Some("Timer"));
    }

    #[test]
    fn test_open_failure() {
        let router = populated();
        router.fail_next(Fault::Open);
        assert!(matches!(
            get_devices(&router),
            Err(DeviceError::Session(_))
        ));
    }

    #[test]
    fn test_enumerated_device_connects() {
        let router = populated();
        let mut devices = get_user_devices(&router).unwrap();
        let keys = &mut devices[0];

        keys.connect().unwrap();
        assert!(keys.is_connected());
        assert!(router.is_subscribed(keys.addr(), keys.local_addr().unwrap()));
    }
}
