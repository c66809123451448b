//! Round trips for every replication message at every version that carries it

use ldaprepl_core::ldap::{Modification, ModificationType, RawAttribute};
use ldaprepl_core::operation::{InternalConnection, LdapOperation, OperationContext, OperationKind};
use ldaprepl_core::protocol::*;
use ldaprepl_core::{Csn, Error, ServerState};
use proptest::prelude::*;
use std::collections::BTreeSet;

const T: u64 = 1_700_000_000_000;

fn state(csns: &[Csn]) -> ServerState {
    let mut state = ServerState::new();
    for csn in csns {
        state.update(*csn);
    }
    state
}

fn description(value: &str) -> Vec<Modification> {
    vec![Modification::new(
        ModificationType::Replace,
        RawAttribute::new("description", [value]),
    )]
}

fn ecl_attrs() -> Vec<RawAttribute> {
    vec![
        RawAttribute::new("cn", ["Barbara Jensen"]),
        RawAttribute::new("uid", ["bjensen"]),
    ]
}

fn full_ds_info() -> DsInfo {
    let mut info = DsInfo::new(-436, 493, -227896, ServerStatus::Degraded, 0xf7);
    info.assured = true;
    info.assured_mode = AssuredMode::SafeRead;
    info.safe_data_level = 0xf9;
    info.referral_urls = vec!["ldap://ldap.example.com/o=test??sub".to_string()];
    info.ecl_includes = BTreeSet::from(["cn".to_string()]);
    info.ecl_includes_for_deletes = BTreeSet::from(["uid".to_string(), "sn".to_string()]);
    info.url = "ds1.example.com:1389".to_string();
    info.protocol_version = Some(ProtocolVersion::V7);
    info
}

fn full_rs_info() -> RsInfo {
    let mut info = RsInfo::new(4527, 45316, 103);
    info.weight = 4;
    info.url = "rs1.example.com:8989".to_string();
    info
}

/// One populated instance of every message kind
fn samples() -> Vec<ReplicationMessage> {
    let csn = Csn::new(T, 123, 45);
    let rs_state = state(&[Csn::new(T, 1, 111), Csn::new(T + 5, 2, 222)]);
    vec![
        AddMsg::new(
            csn,
            "cn=Barbara Jensen,ou=People,dc=example,dc=com",
            "c3ba8a7e-0000-0001-0000-000000000001",
            Some("c3ba8a7e-0000-0001-0000-000000000000".to_string()),
            vec!["top".to_string(), "person".to_string()],
            vec![
                RawAttribute::new("cn", ["Barbara Jensen"]),
                RawAttribute::new("sn", ["Jensen"]),
            ],
            vec![RawAttribute::new("creatorsName", ["cn=Directory Manager"])],
        )
        .with_assured(true)
        .with_assured_mode(AssuredMode::SafeRead)
        .with_safe_data_level(3)
        .with_ecl_includes(ecl_attrs())
        .into(),
        ModifyMsg::new(csn, "dc=example,dc=com", "uuid-1", description("new value"))
            .with_ecl_includes(ecl_attrs())
            .into(),
        DeleteMsg::new(csn, "ou=Old,dc=example,dc=com", "uuid-2")
            .with_subtree(true)
            .with_initiators_name("cn=Directory Manager")
            .with_assured(true)
            .into(),
        ModifyDnMsg::new(csn, "cn=a,ou=People,dc=example,dc=com", "uuid-3", "cn=b", true)
            .with_new_superior("ou=Staff,dc=example,dc=com", Some("uuid-4".to_string()))
            .with_modifications(description("moved"))
            .into(),
        GenericUpdateMsg::new(csn, b"opaque payload".to_vec())
            .with_assured(AssuredMode::SafeData, 2)
            .into(),
        AckMsg::with_errors(csn, true, false, true, vec![12345, -12345, 0]).into(),
        ServerStartMsg::new(
            16,
            "ds1.example.com:1389",
            "dc=example,dc=com",
            100,
            rs_state.clone(),
            1248,
            true,
            31,
        )
        .into(),
        ReplServerStartMsg::new(
            25,
            "rs1.example.com:8989",
            "dc=example,dc=com",
            1000,
            rs_state.clone(),
            1248,
            false,
            3,
            3456,
        )
        .into(),
        StartSessionMsg::new(
            ServerStatus::Normal,
            vec!["ldap://ldap.example.com/dc=example,dc=com".to_string()],
        )
        .with_assured(AssuredMode::SafeData, 2)
        .with_ecl_includes(
            BTreeSet::from(["cn".to_string(), "uid".to_string()]),
            BTreeSet::from(["entryUUID".to_string()]),
        )
        .into(),
        ChangeStatusMsg::request(ServerStatus::FullUpdate).into(),
        ChangeStatusMsg::announce(ServerStatus::Degraded).into(),
        StopMsg.into(),
        TopologyMsg::new(vec![full_ds_info()], vec![full_rs_info(), RsInfo::new(0, -21113, 98)]).into(),
        WindowMsg::new(100).into(),
        WindowProbeMsg.into(),
        HeartbeatMsg.into(),
        ChangeTimeHeartbeatMsg::new(csn).into(),
        ReplicaOfflineMsg::new(Csn::new(T, 0, 45)).into(),
        {
            let mut msg = InitializeRequestMsg::new("dc=example,dc=com", 2, 1);
            msg.init_window = 250;
            msg.into()
        },
        {
            let mut msg = InitializeTargetMsg::new("dc=example,dc=com", 1, 2, 2, 4);
            msg.init_window = 250;
            msg.into()
        },
        EntryMsg::new(1, 2, b"dn: dc=example,dc=com\nobjectClass: top\n\n".to_vec(), 7).into(),
        DoneMsg {
            sender_id: 1,
            destination_id: 2,
        }
        .into(),
        ErrorMsg::new(8, 9, 15138893, "generation id mismatch").into(),
        ResetGenerationIdMsg { generation_id: -1 }.into(),
        InitializeRcvAckMsg {
            sender_id: 2,
            destination_id: 1,
            num_ack: 64,
        }
        .into(),
        MonitorRequestMsg {
            sender_id: 3,
            destination_id: 25,
        }
        .into(),
        MonitorMsg::new(25, 3)
            .with_replication_server_state(rs_state.clone())
            .with_ds_peer(111, state(&[Csn::new(T, 1, 111)]), T as i64 - 10)
            .with_rs_peer(26, rs_state, 0)
            .into(),
    ]
}

#[test]
fn test_round_trip_every_message_every_version() {
    for msg in samples() {
        for version in ProtocolVersion::ALL {
            if version < msg.min_version() {
                continue;
            }
            let bytes = msg.encode(version).unwrap();
            assert_eq!(bytes[0], msg.message_type(version).as_u8());
            let decoded = ReplicationMessage::decode_any(&bytes, version)
                .unwrap_or_else(|e| panic!("{:?} at {}: {}", msg.message_type(version), version, e));
            assert_eq!(decoded.encode(version).unwrap(), bytes, "{:?} at {}", decoded, version);
            if version == ProtocolVersion::CURRENT {
                assert_eq!(decoded, msg);
            }
        }
    }
}

#[test]
fn test_below_min_version_refused() {
    for msg in samples() {
        for version in ProtocolVersion::ALL {
            if version >= msg.min_version() {
                break;
            }
            assert!(
                msg.encode(version).is_err(),
                "{:?} encoded at {}",
                msg.message_type(ProtocolVersion::CURRENT),
                version
            );
        }
    }
}

#[test]
fn test_fields_missing_at_old_versions_take_defaults() {
    let request: ReplicationMessage = {
        let mut msg = InitializeRequestMsg::new("dc=example,dc=com", 2, 1);
        msg.init_window = 250;
        msg.into()
    };
    let bytes = request.encode(ProtocolVersion::V3).unwrap();
    let ReplicationMessage::InitializeRequest(decoded) =
        ReplicationMessage::decode_any(&bytes, ProtocolVersion::V3).unwrap()
    else {
        panic!("expected an initialize request");
    };
    assert_eq!(decoded.init_window, DEFAULT_INIT_WINDOW);

    let entry = EntryMsg::new(1, 2, b"dn: dc=x\n\n".to_vec(), 7);
    let decoded = EntryMsg::decode(&entry.encode(ProtocolVersion::V3).unwrap(), ProtocolVersion::V3).unwrap();
    assert_eq!(decoded.msg_id, -1);
    assert_eq!(decoded.entry_bytes, entry.entry_bytes);

    let error = ErrorMsg::new(8, 9, 1, "boom");
    let decoded = ErrorMsg::decode(&error.encode(ProtocolVersion::V3).unwrap(), ProtocolVersion::V3).unwrap();
    assert_eq!(decoded.creation_time, 0);
    assert_eq!(decoded.details, "boom");

    let rs = full_rs_info();
    let topology = TopologyMsg::new(Vec::new(), vec![rs]);
    let decoded = TopologyMsg::decode(&topology.encode(ProtocolVersion::V3).unwrap(), ProtocolVersion::V3).unwrap();
    assert_eq!(decoded.rs_infos()[0].weight, DEFAULT_RS_WEIGHT);
    assert_eq!(decoded.rs_infos()[0].url, "");
}

/// Tag swaps that still decode at the current version
///
/// Empty bodies, a lone number, two numbers and a 14 byte CSN are shared
/// layouts. An error report also reads as an entry whose bytes are the
/// details and the creation time; the reverse fails on the missing time.
fn retag_decodes(from: MessageType, to: MessageType) -> bool {
    const SHARED: [&[MessageType]; 4] = [
        &[MessageType::Heartbeat, MessageType::WindowProbe, MessageType::Stop],
        &[MessageType::Window, MessageType::ResetGenerationId],
        &[MessageType::Done, MessageType::MonitorRequest],
        &[MessageType::ChangeTimeHeartbeat, MessageType::ReplicaOffline],
    ];
    SHARED
        .iter()
        .any(|group| group.contains(&from) && group.contains(&to))
        || (from == MessageType::Error && to == MessageType::Entry)
}

#[test]
fn test_retagged_messages_rejected() {
    let v = ProtocolVersion::CURRENT;
    let tags: Vec<MessageType> = (0..=u8::MAX)
        .filter_map(|tag| MessageType::try_from(tag).ok())
        .collect();
    for msg in samples() {
        let from = msg.message_type(v);
        let bytes = msg.encode(v).unwrap();
        for &to in &tags {
            if to == from {
                continue;
            }
            let mut retagged = bytes.clone();
            retagged[0] = to.as_u8();
            match ReplicationMessage::decode_any(&retagged, v) {
                Ok(decoded) => {
                    assert!(
                        retag_decodes(from, to),
                        "{:?} accepted as {:?}: {}",
                        from,
                        to,
                        hex::encode(&retagged)
                    );
                    assert_eq!(decoded.message_type(v), to);
                }
                Err(e) => assert!(
                    !retag_decodes(from, to),
                    "{:?} rejected as {:?}: {}",
                    from,
                    to,
                    e
                ),
            }
        }
    }
}

#[test]
fn test_truncated_messages_rejected() {
    for msg in samples() {
        let bytes = msg.encode(ProtocolVersion::CURRENT).unwrap();
        if bytes.len() < 2 {
            continue;
        }
        let truncated = &bytes[..bytes.len() / 2];
        assert!(
            ReplicationMessage::decode_any(truncated, ProtocolVersion::CURRENT).is_err(),
            "truncated {:?} accepted",
            msg.message_type(ProtocolVersion::CURRENT)
        );
    }
}

#[test]
fn test_update_from_other_session_version_rejected() {
    let bytes = DeleteMsg::new(Csn::new(T, 1, 2), "dc=x", "u")
        .encode(ProtocolVersion::V5)
        .unwrap();
    assert!(matches!(
        ReplicationMessage::decode_any(&bytes, ProtocolVersion::V6),
        Err(Error::VersionMismatch(_))
    ));
}

#[test]
fn test_topology_empty_lists() {
    for version in [ProtocolVersion::V2, ProtocolVersion::V4, ProtocolVersion::CURRENT] {
        let msg = TopologyMsg::new(Vec::new(), Vec::new());
        let decoded = TopologyMsg::decode(&msg.encode(version).unwrap(), version).unwrap();
        assert!(decoded.ds_infos().is_empty());
        assert!(decoded.rs_infos().is_empty());
    }
}

#[test]
fn test_add_operation_round_trip() {
    let conn = InternalConnection::new(1);
    let csn = Csn::new(T, 123, 45);
    let op = LdapOperation::new(
        &conn,
        "cn=Barbara Jensen,ou=People,dc=example,dc=com",
        OperationKind::Add {
            object_classes: vec!["top".to_string(), "inetOrgPerson".to_string()],
            user_attributes: vec![
                RawAttribute::new("cn", ["Barbara Jensen"]),
                RawAttribute::new("sn", ["Jensen"]),
            ],
            operational_attributes: vec![RawAttribute::new("creatorsName", ["cn=Directory Manager"])],
        },
    )
    .with_context(OperationContext::new(csn, "uuid-entry").with_parent_entry_uuid("uuid-parent"));

    let LdapUpdate::Add(msg) = LdapUpdate::from_operation(&op).unwrap() else {
        panic!("expected an add");
    };
    let msg = msg
        .with_assured(true)
        .with_assured_mode(AssuredMode::SafeRead)
        .with_safe_data_level(3)
        .with_ecl_includes(ecl_attrs());

    let bytes = msg.encode(ProtocolVersion::CURRENT).unwrap();
    let decoded = AddMsg::decode(&bytes, ProtocolVersion::CURRENT).unwrap();
    assert_eq!(decoded.csn(), csn);
    assert_eq!(decoded.dn(), op.dn);
    assert_eq!(decoded.entry_uuid(), "uuid-entry");
    assert_eq!(decoded.parent_entry_uuid(), Some("uuid-parent"));
    assert!(decoded.is_assured());
    assert_eq!(decoded.assured_mode(), AssuredMode::SafeRead);
    assert_eq!(decoded.safe_data_level(), 3);
    assert_eq!(decoded.ecl_includes(), ecl_attrs().as_slice());
    assert_eq!(decoded.object_classes(), msg.object_classes());
    assert_eq!(decoded.user_attributes(), msg.user_attributes());
    assert_eq!(decoded.operational_attributes(), msg.operational_attributes());

    let replay = decoded.create_operation(&InternalConnection::default());
    assert!(replay.synchronization);
    assert_eq!(replay.dn, op.dn);
    assert_eq!(replay.csn(), Some(csn));
    assert_eq!(replay.context, op.context);
    assert_eq!(replay.kind, op.kind);
}

#[test]
fn test_modify_dn_operation_round_trip() {
    let conn = InternalConnection::new(2);
    let op = LdapOperation::new(
        &conn,
        "cn=a,ou=People,dc=example,dc=com",
        OperationKind::ModifyDn {
            new_rdn: "cn=b".to_string(),
            delete_old_rdn: true,
            new_superior: Some("ou=Staff,dc=example,dc=com".to_string()),
            modifications: description("moved"),
        },
    )
    .with_context(OperationContext::new(Csn::new(T, 9, 3), "uuid-a").with_parent_entry_uuid("uuid-staff"));

    let update = LdapUpdate::from_operation(&op).unwrap();
    let bytes = update.encode(ProtocolVersion::CURRENT).unwrap();
    let ReplicationMessage::Update(decoded) =
        ReplicationMessage::decode_any(&bytes, ProtocolVersion::CURRENT).unwrap()
    else {
        panic!("expected an update");
    };
    let LdapUpdate::ModifyDn(msg) = &decoded else {
        panic!("expected a modify-DN");
    };
    assert_eq!(msg.new_dn(), "cn=b,ou=Staff,dc=example,dc=com");

    let replay = decoded.create_operation(&conn);
    assert_eq!(replay.kind, op.kind);
    assert_eq!(replay.context, op.context);
}

#[test]
fn test_operation_without_context_refused() {
    let conn = InternalConnection::new(3);
    let op = LdapOperation::new(
        &conn,
        "dc=example,dc=com",
        OperationKind::Delete {
            subtree: false,
            initiators_name: None,
        },
    );
    assert!(LdapUpdate::from_operation(&op).is_err());
}

#[test]
fn test_server_state_tracks_newest_per_replica() {
    let mut state = ServerState::new();
    assert!(state.update(Csn::new(T, 1, 111)));
    assert!(state.update(Csn::new(T, 123, 222)));
    assert_eq!(state.len(), 2);
    assert_eq!(state.csn(111), Some(Csn::new(T, 1, 111)));
    assert_eq!(state.csn(222), Some(Csn::new(T, 123, 222)));

    assert!(!state.update(Csn::new(T - 1, 500, 111)));
    assert_eq!(state.len(), 2);
    assert_eq!(state.csn(111), Some(Csn::new(T, 1, 111)));
}

#[test]
fn test_ack_with_mixed_failed_servers() {
    let csn = Csn::new(T, 123, 45);
    let failed = vec![12345, -12345, 31657, -28456, 0];
    let msg = AckMsg::with_errors(csn, true, false, false, failed.clone());
    let decoded = AckMsg::decode(&msg.encode(ProtocolVersion::CURRENT).unwrap(), ProtocolVersion::CURRENT).unwrap();
    assert_eq!(decoded, msg);
    assert!(decoded.has_timeout());
    assert!(!decoded.has_wrong_status());
    assert!(!decoded.has_replay_error());
    assert_eq!(decoded.failed_servers(), failed.as_slice());
}

#[test]
fn test_monitor_peers() {
    let ds = [
        (1201, state(&[Csn::new(T, 1, 1201)]), T as i64 - 3000),
        (-7, state(&[Csn::new(T + 1, 2, 7), Csn::new(T, 3, 8)]), T as i64 - 2000),
        (33, ServerState::new(), 0),
    ];
    let rs_state = state(&[Csn::new(T + 9, 0, 1201)]);
    let mut msg = MonitorMsg::new(25, 3).with_rs_peer(26, rs_state.clone(), T as i64 - 1000);
    for (id, state, approx) in &ds {
        msg = msg.with_ds_peer(*id, state.clone(), *approx);
    }

    let decoded = MonitorMsg::decode(&msg.encode(ProtocolVersion::CURRENT).unwrap(), ProtocolVersion::CURRENT).unwrap();
    assert_eq!(decoded, msg);
    let mut expected: Vec<ReplicaId> = ds.iter().map(|(id, _, _)| *id).collect();
    expected.sort_unstable();
    assert_eq!(decoded.ds_peers().map(|(id, _)| id).collect::<Vec<_>>(), expected);
    for (id, state, approx) in &ds {
        let peer = decoded.ds_peer(*id).unwrap();
        assert_eq!(&peer.state, state);
        assert_eq!(peer.approx_first_missing_date, *approx);
    }
    let rs: Vec<_> = decoded.rs_peers().collect();
    assert_eq!(rs.len(), 1);
    assert_eq!(rs[0].0, 26);
    assert_eq!(rs[0].1.state, rs_state);
    assert_eq!(rs[0].1.approx_first_missing_date, T as i64 - 1000);
}

#[test]
fn test_messages_serialize_to_json() {
    for msg in samples() {
        let json = serde_json::to_string(&msg).unwrap();
        let back: ReplicationMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

proptest! {
    #[test]
    fn prop_decode_arbitrary_bytes_never_panics(
        bytes in proptest::collection::vec(any::<u8>(), 0..256),
        version in 1u8..=8,
    ) {
        let version = ProtocolVersion::try_from(version).unwrap();
        let _ = ReplicationMessage::decode_any(&bytes, version);
    }

    #[test]
    fn prop_ack_failed_servers_preserved(
        flags in 0u8..8,
        failed in proptest::collection::vec(any::<i32>(), 0..16),
    ) {
        let msg = AckMsg::with_errors(
            Csn::new(T, 0, 1),
            flags & 1 != 0,
            flags & 2 != 0,
            flags & 4 != 0,
            failed,
        );
        let bytes = msg.encode(ProtocolVersion::CURRENT).unwrap();
        prop_assert_eq!(AckMsg::decode(&bytes, ProtocolVersion::CURRENT).unwrap(), msg);
    }
}
