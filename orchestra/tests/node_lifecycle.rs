/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! One node through join, child churn and parent switch, driven end to end
//! from a YAML configuration.

use orchestra::config::OrchestraConfig;
use orchestra::driver::{self, DriverHandle, DEFAULT_QUEUE_CAPACITY};
use orchestra::hash::LinkAddrHash;
use orchestra::linkaddr::LinkAddress;
use orchestra::packet::Packet;
use orchestra::routing::InMemoryRoutes;
use orchestra::rule::{Rule, UnicastMsf};
use orchestra::schedule::{InMemorySchedule, LinkOptions, LinkType, TschSchedule};
use orchestra::{Orchestra, PacketSelection};

const EB: u16 = 0;
const UNICAST: u16 = 1;
const COMMON: u16 = 2;

fn addr(id: u16) -> LinkAddress {
    LinkAddress::from_node_id(id)
}

fn options(schedule: &InMemorySchedule, handle: u16, timeslot: u16) -> Option<LinkOptions> {
    schedule.link(handle, timeslot).map(|l| l.options)
}

async fn send_unicast(handle: &DriverHandle, to: u16) -> PacketSelection {
    handle
        .packet_ready(Packet::unicast_data(addr(to)))
        .await
        .unwrap()
        .expect("unicast packet claimed")
}

fn msf_node() -> Orchestra<InMemorySchedule> {
    let rules: Vec<Box<dyn Rule>> = vec![Box::new(UnicastMsf::new(7, false))];
    let mut orchestra = Orchestra::new(
        addr(3),
        LinkAddrHash::LastByte,
        rules,
        InMemorySchedule::new(),
    );
    orchestra.init().unwrap();
    orchestra
}

const STORING_CONFIG: &str = r##"
node_address: "#3"
rules: [eb_per_time_source, unicast_per_neighbor_rpl_storing, default_common]
unicast_period: 7
common_shared_period: 5
ebsf_period: 11
"##;

#[tokio::test]
async fn storing_mode_node_follows_topology() {
    let cfg = OrchestraConfig::from_yaml_str(STORING_CONFIG).unwrap();
    let mut orchestra = cfg.build_orchestra();
    orchestra.init().unwrap();

    let common = orchestra.schedule().link(COMMON, 0).unwrap();
    assert_eq!(
        common.link_type,
        LinkType::Normal,
        "EB rule carries the beacons"
    );

    let (handle, drv) = driver::channel(orchestra, InMemoryRoutes::new(), DEFAULT_QUEUE_CAPACITY);
    let task = tokio::spawn(drv.run());

    // Join under #5, then #10 (same unicast slot as us) becomes a child.
    handle
        .time_source_changed(None, Some(addr(5)))
        .await
        .unwrap();
    handle.child_added(addr(10)).await.unwrap();

    let to_child = send_unicast(&handle, 10).await;
    assert_eq!((to_child.slotframe, to_child.timeslot), (UNICAST, 3));
    let to_parent = send_unicast(&handle, 5).await;
    assert_eq!((to_parent.slotframe, to_parent.timeslot), (UNICAST, 5));
    let to_stranger = send_unicast(&handle, 6).await;
    assert_eq!((to_stranger.slotframe, to_stranger.timeslot), (COMMON, 0));
    let beacon = handle.packet_ready(Packet::beacon()).await.unwrap().unwrap();
    assert_eq!((beacon.slotframe, beacon.timeslot), (EB, 3));

    handle.child_removed(addr(10)).await.unwrap();

    // #12 hashes to the same unicast slot as #5 but not the same EB slot.
    handle
        .time_source_changed(Some(addr(5)), Some(addr(12)))
        .await
        .unwrap();

    drop(handle);
    let (orchestra, routes) = task.await.unwrap();
    let sched = orchestra.schedule();

    assert!(routes.is_empty());
    assert_eq!(orchestra.time_source(), Some(&addr(12)));

    assert_eq!(options(sched, UNICAST, 3), Some(LinkOptions::RX));
    assert_eq!(
        options(sched, UNICAST, 5),
        Some(LinkOptions::TX | LinkOptions::SHARED)
    );
    assert_eq!(sched.slotframe(UNICAST).unwrap().link_count(), 2);

    assert_eq!(options(sched, EB, 3), Some(LinkOptions::TX));
    assert_eq!(options(sched, EB, 5), None);
    assert_eq!(options(sched, EB, 1), Some(LinkOptions::RX));
}

#[test]
fn msf_parent_on_own_slot_keeps_rx() {
    let mut orchestra = msf_node();
    let routes = InMemoryRoutes::new();

    let own = LinkOptions::TX | LinkOptions::RX | LinkOptions::SHARED;
    let other = LinkOptions::TX | LinkOptions::SHARED;
    let sched = orchestra.schedule();
    for ts in 0..7 {
        let expected = if ts == 3 { own } else { other };
        assert_eq!(options(sched, 0, ts), Some(expected), "after init, ts {ts}");
    }

    orchestra
        .new_time_source(None, Some(&addr(5)), &routes)
        .unwrap();
    assert_eq!(options(orchestra.schedule(), 0, 5), Some(own));

    orchestra
        .new_time_source(Some(&addr(5)), Some(&addr(10)), &routes)
        .unwrap();
    let sched = orchestra.schedule();
    assert_eq!(options(sched, 0, 5), Some(other));
    assert_eq!(options(sched, 0, 3), Some(own));
    assert_eq!(sched.slotframe(0).unwrap().link_count(), 7);
}

#[test]
fn msf_child_traffic_uses_own_slot() {
    let mut orchestra = msf_node();
    orchestra
        .new_time_source(None, Some(&addr(5)), &InMemoryRoutes::new())
        .unwrap();

    let routes: InMemoryRoutes = [addr(9)].into_iter().collect();
    let child = orchestra
        .select_packet(&Packet::unicast_data(addr(9)), &routes)
        .unwrap();
    assert_eq!(child.timeslot, 3);
    let parent = orchestra
        .select_packet(&Packet::unicast_data(addr(5)), &routes)
        .unwrap();
    assert_eq!(parent.timeslot, 5);
}
