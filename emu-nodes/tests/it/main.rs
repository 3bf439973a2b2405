mod networks;
mod ptp;
mod rj45;
mod wlan;

/// Shared helpers.
mod helpers {
    use std::sync::Arc;

    use emu_common::ObjId;
    use emu_host::testing::SimHost;
    use emu_nodes::{LinkParams, VirtualIf};

    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    /// An interface of node `node` that also exists as a device on the simulated host.
    pub fn veth(sim: &SimHost, node: u32, addrs: &[&str], params: LinkParams) -> Arc<VirtualIf> {
        let name = format!("veth{node}.0");
        sim.add_link(&name, false, &[]);
        Arc::new(VirtualIf::new(name, ObjId(node), 0).with_addrs(addrs.iter().copied()).with_params(params))
    }

    pub fn delay(us: u64) -> LinkParams {
        LinkParams { delay: Some(us), ..Default::default() }
    }
}
