//! Whole-session scenarios driven through the loopback transport with
//! synthetic tick timestamps.

use std::time::{Duration, Instant};

use agent_client::{
    movement::{Direction, MovementValidator},
    session::{MoveOutcome, BOOTSTRAP_ENTITY_ID},
    LoopbackTransport, Session, SessionState,
};
use agent_shared::{
    component::{Authority, ComponentData, ComponentKind, Heartbeat},
    config::AgentConfig,
    coords::MapGeometry,
    math::Vec3,
    net::{Command, InboundEvent, OutboundAction},
};
use agent_tests::{
    feed, first_free_entity_id, grant_agent, init_tracing, seed_world, seed_world_with, OPEN,
    WALL,
};
use rand::{rngs::StdRng, SeedableRng};

const TICK: Duration = Duration::from_millis(33);

async fn new_session(cfg: AgentConfig, seed: u64) -> (Session<LoopbackTransport>, Instant) {
    init_tracing();
    let t0 = Instant::now();
    let mut session =
        Session::new(cfg, LoopbackTransport::new(), t0).with_rng(StdRng::seed_from_u64(seed));
    session.start(t0).await.expect("start");
    (session, t0)
}

fn positions(sent: &[OutboundAction]) -> Vec<Vec3> {
    sent.iter()
        .filter_map(|a| match a {
            OutboundAction::ComponentUpdate {
                data: ComponentData::Position(p),
                ..
            } => Some(*p),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn full_lifecycle_from_create_to_teardown() {
    let mut cfg = AgentConfig::default();
    cfg.behavior.direction_change_chance_percent = 0;
    let map = cfg.map;
    let agent = first_free_entity_id(&map);
    let (mut session, t0) = new_session(cfg, 1).await;

    let sent = session.transport_mut().take_sent();
    let request_id = match &sent[..] {
        [OutboundAction::CommandRequest {
            request_id,
            target,
            command: Command::CreateAgentEntity {
                starting_region: None,
            },
        }] => {
            assert_eq!(*target, BOOTSTRAP_ENTITY_ID);
            *request_id
        }
        other => panic!("unexpected startup actions {other:?}"),
    };

    // Simulation answers, streams the world and hands over the agent.
    let t = session.transport_mut();
    t.push_event(InboundEvent::CommandResponse {
        request_id,
        status_code: 0,
    });
    feed(t, seed_world(&map));
    feed(t, grant_agent(agent, Vec3::ZERO));

    let mut now = t0;
    for _ in 0..10 {
        let outcome = session.tick(now).await;
        assert!(matches!(outcome, MoveOutcome::Published(_)), "{outcome:?}");
        now += TICK;
    }
    assert_eq!(session.state(), SessionState::Authoritative);
    assert_eq!(session.view().entity_count(), 400 * 3 + 1);

    let published = positions(session.transport().sent());
    assert_eq!(published.len(), 10);
    assert!((published[9].y - 10.0 * 0.0495).abs() < 1e-4);
    assert!(published.iter().all(|p| p.x == 0.0));

    // A pong with a 100ms round trip; the first sample moves the mean halfway.
    let sent_at = (now - t0).as_micros() as i64 - 100_000;
    session.transport_mut().push_event(InboundEvent::ComponentUpdated {
        id: agent,
        data: ComponentData::HeartbeatPong(Heartbeat {
            last_updated_time: Some(sent_at),
        }),
    });
    session.tick(now).await;
    assert!((session.liveness().mean_latency_ms() - 50.0).abs() < 1e-9);

    // Authority is revoked; everything stops.
    session.transport_mut().push_event(InboundEvent::AuthorityChanged {
        id: agent,
        kind: ComponentKind::Agent,
        authority: Authority::NotAuthoritative,
    });
    session.transport_mut().take_sent();
    session.tick(now + TICK).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.ping_scheduled());

    session.tick(now + Duration::from_secs(5)).await;
    assert!(session.transport().sent().is_empty());

    session.shutdown();
    assert_eq!(session.scheduled_tasks(), 0);
}

#[tokio::test]
async fn wandering_never_publishes_an_invalid_footprint() {
    let mut cfg = AgentConfig::default();
    cfg.behavior.velocity = 30.0;
    let map = cfg.map;
    let agent = first_free_entity_id(&map);
    let (mut session, t0) = new_session(cfg, 42).await;

    // Scattered walls plus a fence around the 2x2 chunk pen at (10, 10).
    let world = seed_world_with(&map, |chunk, x, z| {
        let in_pen = (10..=11).contains(&chunk.x) && (10..=11).contains(&chunk.z);
        let fence = (chunk.x == 10 && x == 0)
            || (chunk.x == 11 && x == 9)
            || (chunk.z == 10 && z == 0)
            || (chunk.z == 11 && z == 9);
        if (in_pen && fence) || (x * 3 + z * 5) % 11 == 4 {
            WALL
        } else {
            OPEN
        }
    });
    feed(session.transport_mut(), world);
    feed(session.transport_mut(), grant_agent(agent, Vec3::new(5.5, 5.5, 0.0)));

    let mut now = t0;
    let mut published = 0;
    let mut rejected = 0;
    for _ in 0..3000 {
        match session.tick(now).await {
            MoveOutcome::Published(p) => {
                let validator = MovementValidator::new(&map, session.view(), 0.9);
                assert!(validator.check(p).is_ok(), "published invalid position {p:?}");
                published += 1;
            }
            MoveOutcome::Rejected(_) => rejected += 1,
            MoveOutcome::Idle => panic!("agent went idle"),
        }
        now += TICK;
    }

    assert!(published > 0);
    assert!(rejected > 0);
    // The fence keeps the agent inside the pen.
    let last = session.view().position(agent).unwrap();
    let tile = map.world_to_tile(f64::from(last.x), f64::from(last.y));
    assert!((10..=11).contains(&tile.chunk.x), "{tile:?}");
    assert!((10..=11).contains(&tile.chunk.z), "{tile:?}");
}

#[tokio::test]
async fn blocked_direction_is_abandoned() {
    let mut cfg = AgentConfig::default();
    cfg.behavior.direction_change_chance_percent = 100;
    cfg.behavior.direction_change_period_ms = 3_600_000;
    let map: MapGeometry = cfg.map;
    let agent = first_free_entity_id(&map);
    let (mut session, t0) = new_session(cfg, 9).await;

    // Chunk row z = 11 is solid, so heading up from the top of chunk
    // (10, 10) is impossible.
    feed(
        session.transport_mut(),
        seed_world_with(&map, |chunk, _, _| if chunk.z == 11 { WALL } else { OPEN }),
    );
    // Let the scheduled direction roll run before the agent exists.
    session.tick(t0).await;
    session.agent_mut().direction = Direction::Up;

    let before = Vec3::new(5.0, 9.54, 0.0);
    feed(session.transport_mut(), grant_agent(agent, before));
    session.transport_mut().take_sent();

    let outcome = session.tick(t0 + TICK).await;
    assert!(matches!(outcome, MoveOutcome::Rejected(_)), "{outcome:?}");
    assert_ne!(session.agent().direction, Direction::Up);
    assert_eq!(session.view().position(agent), Some(before));
    assert!(positions(session.transport().sent()).is_empty());

    // The next step follows the new direction and succeeds.
    let outcome = session.tick(t0 + 2 * TICK).await;
    assert!(matches!(outcome, MoveOutcome::Published(_)), "{outcome:?}");
}

#[tokio::test]
async fn host_position_follows_drift_with_swapped_axes() {
    let mut cfg = AgentConfig::default();
    cfg.behavior.direction_change_chance_percent = 0;
    cfg.behavior.velocity = 15.0;
    let map = cfg.map;
    let agent = first_free_entity_id(&map);
    let (mut session, t0) = new_session(cfg, 3).await;
    feed(session.transport_mut(), seed_world(&map));
    feed(session.transport_mut(), grant_agent(agent, Vec3::ZERO));

    let mut now = t0;
    for _ in 0..10 {
        session.tick(now).await;
        now += TICK;
    }

    let hosts: Vec<Vec3> = session
        .transport()
        .sent()
        .iter()
        .filter_map(|a| match a {
            OutboundAction::ComponentUpdate {
                data: ComponentData::HostPosition(p),
                ..
            } => Some(*p),
            _ => None,
        })
        .collect();

    // 0.495 units per tick: republished on every third tick.
    assert_eq!(hosts.len(), 3);
    for pair in hosts.windows(2) {
        assert!(pair[1].distance_sq(pair[0]) > 1.0);
    }
    for host in &hosts {
        assert_eq!(host.x, 0.0);
        assert_eq!(host.y, 0.0);
        assert!(host.z > 0.0);
    }
}

#[tokio::test]
async fn disconnect_before_authority_ends_session() {
    let (mut session, t0) = new_session(AgentConfig::default(), 5).await;
    session.transport_mut().push_event(InboundEvent::Disconnected {
        reason: "worker evicted".to_string(),
    });

    assert_eq!(session.tick(t0).await, MoveOutcome::Idle);
    assert_eq!(session.state(), SessionState::Disconnected);
}
