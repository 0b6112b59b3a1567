#[cfg(test)]
mod tests {
    use alsamidi::router::{Addr, PortCaps};
    use alsamidi::*;

    fn duplex() -> PortCaps {
        PortCaps::READ | PortCaps::SUBS_READ | PortCaps::WRITE | PortCaps::SUBS_WRITE
    }

    fn key(name: &str, addr: Addr) -> DeviceKey {
        DeviceKey {
            name: name.to_string(),
            client: addr.client,
            port: addr.port,
        }
    }

    #[test]
    fn test_first_scan_reports_everything_plugged() {
        let router = MockRouter::new();
        let client = router.add_client("nanoKONTROL2");
        let addr = router.add_port(client, "nanoKONTROL2 MIDI 1", duplex());
        let mut pool = DevicePool::new(router.clone());

        let report = pool.scan().unwrap();
        assert_eq!(report.plugged, vec![key("nanoKONTROL2 MIDI 1", addr)]);
        assert!(report.unplugged.is_empty());
        assert_eq!(pool.plugged().count(), 1);

        assert!(pool.scan().unwrap().is_empty());
    }

    #[test]
    fn test_unplug_and_replug() {
        let router = MockRouter::new();
        let client = router.add_client("Synth");
        let addr = router.add_port(client, "Synth MIDI 1", duplex());
        let synth = key("Synth MIDI 1", addr);
        let mut pool = DevicePool::new(router.clone());
        pool.scan().unwrap();

        router.remove_client(client);
        let report = pool.scan().unwrap();
        assert_eq!(report.unplugged, vec![synth.clone()]);
        assert!(!pool.is_plugged(&synth));
        assert_eq!(pool.unplugged().count(), 1);

        router.add_port(client, "Synth MIDI 1", duplex());
        let report = pool.scan().unwrap();
        assert_eq!(report.plugged, vec![synth.clone()]);
        assert!(pool.is_plugged(&synth));
        assert_eq!(pool.unplugged().count(), 0);
    }

    #[test]
    fn test_rescan_keeps_connected_devices() {
        let router = MockRouter::new();
        let client = router.add_client("Synth");
        let addr = router.add_port(client, "Synth MIDI 1", duplex());
        let synth = key("Synth MIDI 1", addr);
        let mut pool = DevicePool::new(router.clone());
        pool.scan().unwrap();

        pool.get_mut(&synth).unwrap().connect().unwrap();
        pool.scan().unwrap();

        assert!(pool.get(&synth).unwrap().is_connected());
        assert!(pool.find_mut(addr).unwrap().is_connected());
        assert_eq!(router.stats().queues_allocated, 1);
    }

    #[test]
    fn test_unplugged_device_is_closed() {
        let router = MockRouter::new();
        let client = router.add_client("Synth");
        let addr = router.add_port(client, "Synth MIDI 1", duplex());
        let mut pool = DevicePool::new(router.clone());
        pool.scan().unwrap();
        pool.find_mut(addr).unwrap().connect().unwrap();

        router.remove_client(client);
        pool.scan().unwrap();

        let device = pool.unplugged().next().unwrap();
        assert!(!device.is_connected());
        assert_eq!(router.queue_count(), 0);
    }

    #[test]
    fn test_renamed_port_is_a_new_device() {
        let router = MockRouter::new();
        let client = router.add_client("Synth");
        let addr = router.add_port(client, "Synth MIDI 1", duplex());
        let mut pool = DevicePool::new(router.clone());
        pool.scan().unwrap();

        router.remove_client(client);
        router.add_port(client, "Synth MIDI 2", duplex());
        let report = pool.scan().unwrap();

        assert_eq!(report.plugged, vec![key("Synth MIDI 2", addr)]);
        assert_eq!(report.unplugged, vec![key("Synth MIDI 1", addr)]);
    }
}
