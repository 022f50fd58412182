//! Session manager.
//!
//! A session owns everything one agent needs: the transport, the view, the
//! agent's motion state, the liveness monitor and the behaviour scheduler.
//! Only the tick loop touches them, so nothing here is shared or locked.
//!
//! State machine:
//! `Connecting -> Connected -> Authoritative -> Disconnected`.
//! `Disconnected` is terminal; it is checked once per tick and leads to an
//! orderly teardown of every scheduled task.

use std::time::{Duration, Instant};

use agent_shared::{
    component::{Authority, ComponentData, ComponentKind, EntityId, Heartbeat},
    config::AgentConfig,
    math::Vec3,
    net::{Command, InboundEvent, OutboundAction, RequestId},
    view::{AuthorityChange, View},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::{
    liveness::LivenessMonitor,
    movement::{propose_step, Direction, MovementValidator},
    scheduler::{Scheduler, TaskHandle, TaskKind},
    transport::{Connector, Transport},
};

/// Entity that accepts agent-creation commands.
pub const BOOTSTRAP_ENTITY_ID: EntityId = EntityId(1);

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// Connected, no authority over an agent yet.
    Connected,
    /// Holding authority over this session's agent entity.
    Authoritative,
    Disconnected,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect after {attempts} attempts: {last_error}")]
    ConnectExhausted { attempts: u32, last_error: String },
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Motion state of the agent driven by this session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentState {
    pub direction: Direction,
    /// Last canonical position this session published.
    pub last_position: Option<Vec3>,
    /// Last position published to the host system (y/z swapped).
    pub last_host_position: Vec3,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            direction: Direction::Up,
            last_position: None,
            last_host_position: Vec3::ZERO,
        }
    }
}

/// What the movement step did during a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveOutcome {
    /// Not authoritative, or the agent's position is not known yet.
    Idle,
    Published(Vec3),
    Rejected(Vec3),
}

/// Attempts to connect up to `attempts` times with a fixed `delay` between
/// attempts. Running out of attempts is fatal for the caller.
pub async fn connect_with_retry<C: Connector>(
    connector: &mut C,
    attempts: u32,
    delay: Duration,
) -> Result<C::Transport, SessionError> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match connector.connect().await {
            Ok(transport) => {
                info!(attempt, "Connected to simulation");
                return Ok(transport);
            }
            Err(e) => {
                last_error = format!("{e:#}");
                if attempt < attempts {
                    warn!(
                        attempt,
                        error = %last_error,
                        retry_in_ms = delay.as_millis() as u64,
                        "Connection to simulation failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    error!(attempts, error = %last_error, "Failed to connect to simulation, aborting");
    Err(SessionError::ConnectExhausted {
        attempts,
        last_error,
    })
}

/// One agent session.
pub struct Session<T: Transport> {
    cfg: AgentConfig,
    transport: T,
    view: View,
    agent: AgentState,
    liveness: LivenessMonitor,
    scheduler: Scheduler,
    rng: StdRng,
    state: SessionState,
    agent_entity: Option<EntityId>,
    ping_task: Option<TaskHandle>,
    epoch: Instant,
    next_request_id: u64,
}

impl<T: Transport> Session<T> {
    /// Wraps an open transport. Call [`Session::start`] before ticking.
    pub fn new(cfg: AgentConfig, transport: T, now: Instant) -> Self {
        let liveness = LivenessMonitor::new(
            0,
            cfg.behavior.ping_period_ms as f64,
            cfg.behavior.latency_smoothing,
            cfg.behavior.desync_smoothing,
        );
        Self {
            cfg,
            transport,
            view: View::new(),
            agent: AgentState::default(),
            liveness,
            scheduler: Scheduler::new(),
            rng: StdRng::from_entropy(),
            state: SessionState::Connecting,
            agent_entity: None,
            ping_task: None,
            epoch: now,
            next_request_id: 1,
        }
    }

    /// Replaces the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Connects with bounded retries and starts the session.
    pub async fn establish<C>(connector: &mut C, cfg: AgentConfig) -> Result<Self, SessionError>
    where
        C: Connector<Transport = T>,
    {
        let transport =
            connect_with_retry(connector, cfg.network_retries, cfg.retry_delay()).await?;
        let now = Instant::now();
        let mut session = Self::new(cfg, transport, now);
        session.start(now).await?;
        Ok(session)
    }

    /// Schedules the always-on behaviours and requests the agent entity.
    pub async fn start(&mut self, now: Instant) -> Result<RequestId, SessionError> {
        let behavior = &self.cfg.behavior;
        let direction_period = Duration::from_millis(behavior.direction_change_period_ms);
        let status_period = Duration::from_millis(behavior.status_period_ms);
        self.scheduler.schedule_periodic(
            TaskKind::DirectionChange,
            now,
            Duration::ZERO,
            direction_period,
        );
        self.scheduler
            .schedule_periodic(TaskKind::Status, now, Duration::ZERO, status_period);

        let starting_region = self.cfg.starting_region();
        if let Some(region) = starting_region {
            info!(
                min_x = region.min_x,
                min_z = region.min_z,
                size_x = region.size_x,
                size_z = region.size_z,
                "Overriding starting chunk region"
            );
        }

        let request_id = self.next_request_id();
        self.transport
            .send(OutboundAction::CommandRequest {
                request_id,
                target: BOOTSTRAP_ENTITY_ID,
                command: Command::CreateAgentEntity { starting_region },
            })
            .await
            .map_err(|e| {
                error!(error = %format!("{e:#}"), "Failed to send create agent entity request");
                e
            })?;
        info!(request_id = request_id.0, "Sent create agent entity request");

        self.state = SessionState::Connected;
        Ok(request_id)
    }

    /// Runs fixed-rate ticks until the session disconnects, then tears down.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let period = self.cfg.tick_period();
        info!(tick_ms = period.as_millis() as u64, "Entering tick loop");

        while self.state != SessionState::Disconnected {
            let tick_start = Instant::now();
            self.tick(tick_start).await;

            // Overruns start the next tick immediately; missed ticks are dropped.
            if let Some(remaining) = period.checked_sub(tick_start.elapsed()) {
                tokio::time::sleep(remaining).await;
            }
        }

        self.shutdown();
        Ok(())
    }

    /// One tick: drain events, run due tasks, move if authoritative.
    pub async fn tick(&mut self, now: Instant) -> MoveOutcome {
        if self.state == SessionState::Disconnected {
            return MoveOutcome::Idle;
        }

        for event in self.transport.poll_events() {
            self.handle_event(event, now);
        }
        if self.state == SessionState::Disconnected {
            return MoveOutcome::Idle;
        }

        for task in self.scheduler.due(now) {
            self.run_task(task, now).await;
            if self.state == SessionState::Disconnected {
                return MoveOutcome::Idle;
            }
        }
        if self.state != SessionState::Authoritative {
            return MoveOutcome::Idle;
        }

        self.advance_agent().await
    }

    /// Cancels every task and releases the agent.
    pub fn shutdown(&mut self) {
        self.scheduler.clear();
        self.ping_task = None;
        self.agent_entity = None;
        self.state = SessionState::Disconnected;
        info!("Session shut down");
    }

    /// Applies one inbound event.
    pub fn handle_event(&mut self, event: InboundEvent, now: Instant) {
        match event {
            InboundEvent::EntityAdded { id } => {
                trace!(entity = id.0, "Adding entity");
                self.view.add_entity(id);
            }
            InboundEvent::EntityRemoved { id } => {
                trace!(entity = id.0, "Removing entity");
                self.view.remove_entity(id);
            }
            InboundEvent::ComponentUpdated { id, data } => {
                if let ComponentData::HeartbeatPong(pong) = &data {
                    self.on_pong(id, *pong, now);
                }
                if !self.view.update_component(id, data) {
                    trace!(entity = id.0, "Ignoring component update outside the view");
                }
            }
            InboundEvent::ComponentRemoved { id, kind } => {
                if kind != ComponentKind::Unknown {
                    self.view.remove_component(id, kind);
                }
            }
            InboundEvent::AuthorityChanged {
                id,
                kind,
                authority,
            } => {
                if kind == ComponentKind::Unknown {
                    return;
                }
                let change = match self.view.set_authority(id, kind, authority) {
                    Some(change) => change,
                    // The tracked agent may leave the view before its authority does.
                    None if kind == ComponentKind::Agent && self.agent_entity == Some(id) => {
                        AuthorityChange {
                            previous: Authority::Authoritative,
                            current: authority,
                        }
                    }
                    None => {
                        debug!(entity = id.0, ?kind, "Ignoring authority change outside the view");
                        return;
                    }
                };
                if kind == ComponentKind::Agent {
                    self.on_agent_authority(id, change, now);
                }
            }
            InboundEvent::CommandResponse {
                request_id,
                status_code,
            } => {
                info!(
                    request_id = request_id.0,
                    status_code, "Received create agent entity command response"
                );
            }
            InboundEvent::Disconnected { reason } => {
                error!(%reason, "Disconnected from simulation");
                self.state = SessionState::Disconnected;
            }
        }
    }

    fn on_agent_authority(&mut self, id: EntityId, change: AuthorityChange, now: Instant) {
        info!(entity = id.0, authority = ?change.current, "Changing agent authority");

        if change.current == Authority::Authoritative {
            if self.state == SessionState::Disconnected {
                return;
            }
            if self.ping_task.is_none() {
                let period = Duration::from_millis(self.cfg.behavior.ping_period_ms);
                self.ping_task = Some(self.scheduler.schedule_periodic(
                    TaskKind::Ping,
                    now,
                    Duration::ZERO,
                    period,
                ));
            }
            self.agent_entity = Some(id);
            self.state = SessionState::Authoritative;
        } else if change.lost() && self.agent_entity == Some(id) {
            if let Some(ping) = self.ping_task.take() {
                self.scheduler.cancel(ping);
            }
            self.agent_entity = None;
            error!(entity = id.0, "Lost authority over the agent entity");
            self.state = SessionState::Disconnected;
        } else {
            debug!(entity = id.0, "Ignoring authority change for untracked entity");
        }
    }

    fn on_pong(&mut self, id: EntityId, pong: Heartbeat, now: Instant) {
        if self.agent_entity != Some(id) {
            warn!(
                entity = id.0,
                agent = ?self.agent_entity.map(|e| e.0),
                "Received heartbeat pong for an entity that isn't the agent entity, interest setup looks broken"
            );
        }
        let now_micros = self.micros(now);
        self.liveness.on_pong(now_micros, pong.last_updated_time);
    }

    async fn run_task(&mut self, task: TaskKind, now: Instant) {
        match task {
            TaskKind::Ping => {
                let Some(agent) = self.agent_entity else {
                    return;
                };
                let ping = Heartbeat {
                    last_updated_time: Some(self.micros(now)),
                };
                self.send(OutboundAction::ComponentUpdate {
                    id: agent,
                    data: ComponentData::HeartbeatPing(ping),
                })
                .await;
            }
            TaskKind::DirectionChange => {
                self.maybe_change_direction();
            }
            TaskKind::Status => {
                let now_micros = self.micros(now);
                self.liveness.sample_desync(now_micros);
                let status = self.liveness.status(self.view.entity_count());
                info!(
                    entities = status.entities,
                    latency_ms = status.latency_ms,
                    desync_ms = status.desync_ms,
                    "{status}"
                );
            }
        }
    }

    /// With the configured chance, turns to one of the three other directions.
    pub fn maybe_change_direction(&mut self) -> Option<Direction> {
        let chance = self.cfg.behavior.direction_change_chance_percent;
        if self.rng.gen_range(0..100) >= chance {
            return None;
        }
        let next = self.agent.direction.pick_other(&mut self.rng);
        trace!(from = ?self.agent.direction, to = ?next, "Changing direction");
        self.agent.direction = next;
        Some(next)
    }

    async fn advance_agent(&mut self) -> MoveOutcome {
        let Some(agent) = self.agent_entity else {
            return MoveOutcome::Idle;
        };
        if self.view.authority(agent, ComponentKind::Position) != Authority::Authoritative {
            return MoveOutcome::Idle;
        }
        let Some(position) = self.view.position(agent) else {
            return MoveOutcome::Idle;
        };

        let behavior = &self.cfg.behavior;
        let candidate = propose_step(
            position,
            self.agent.direction,
            self.cfg.tick_period_ms(),
            behavior.velocity,
        );
        let valid = MovementValidator::new(&self.cfg.map, &self.view, behavior.character_size)
            .validate_candidate(candidate);
        if !valid {
            self.maybe_change_direction();
            return MoveOutcome::Rejected(candidate);
        }

        let sent = self
            .send(OutboundAction::ComponentUpdate {
                id: agent,
                data: ComponentData::Position(candidate),
            })
            .await;
        if !sent {
            return MoveOutcome::Idle;
        }
        self.view
            .update_component(agent, ComponentData::Position(candidate));
        self.agent.last_position = Some(candidate);
        trace!(
            entity = agent.0,
            x = candidate.x,
            y = candidate.y,
            z = candidate.z,
            "Sent position update"
        );

        let host = candidate.swap_yz();
        if host.distance_sq(self.agent.last_host_position)
            > self.cfg.behavior.host_position_update_distance
        {
            let sent = self
                .send(OutboundAction::ComponentUpdate {
                    id: agent,
                    data: ComponentData::HostPosition(host),
                })
                .await;
            if sent {
                self.agent.last_host_position = host;
            }
        }

        MoveOutcome::Published(candidate)
    }

    /// Sends an action; a failed send ends the session.
    async fn send(&mut self, action: OutboundAction) -> bool {
        match self.transport.send(action).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %format!("{e:#}"), "Failed to send to simulation");
                self.state = SessionState::Disconnected;
                false
            }
        }
    }

    fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn micros(&self, now: Instant) -> i64 {
        now.saturating_duration_since(self.epoch).as_micros() as i64
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut AgentState {
        &mut self.agent
    }

    pub fn agent_entity(&self) -> Option<EntityId> {
        self.agent_entity
    }

    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    pub fn ping_scheduled(&self) -> bool {
        self.ping_task
            .is_some_and(|handle| self.scheduler.is_scheduled(handle))
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.cfg
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
