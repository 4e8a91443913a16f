//! Duel Client
//!
//! Composition root: owns the session, the event bus and the active match.
//! Call [`DuelClient::tick`] once per frame. Each tick drains the session,
//! publishes everything on the bus, routes match messages into the turn
//! machine, sends what the machine asks for, and calls the registered
//! handlers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::core::vec2::Vec2;
use crate::game::combatant::RoleId;
use crate::game::events::{TurnEvent, TurnUpdate};
use crate::game::state::BattlePhase;
use crate::game::turn::{ResolutionMode, TurnError, TurnStateMachine};
use crate::game::weapon::{WeaponCatalog, WeaponId};
use crate::network::bus::{BusEvent, EventBus, OwnerId};
use crate::network::protocol::{ApplyBattleReq, ClientMessage, ServerMessage, OPERATION_REQ};
use crate::network::session::{NetSession, SessionError};
use crate::network::transport::Transport;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No match in progress.
    #[error("No active match")]
    NoMatch,

    /// The turn machine refused the input.
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// The request could not be sent.
    #[error(transparent)]
    Session(#[from] SessionError),
}

type PhaseHandler = Box<dyn FnMut(BattlePhase, BattlePhase) + Send>;
type HitPointsHandler = Box<dyn FnMut(RoleId, f64, f64) + Send>;
type MatchEndedHandler = Box<dyn FnMut(Option<RoleId>) + Send>;
type NoticeHandler = Box<dyn FnMut(&str) + Send>;

#[derive(Default)]
struct Handlers {
    phase_changed: Option<PhaseHandler>,
    hit_points_changed: Option<HitPointsHandler>,
    match_ended: Option<MatchEndedHandler>,
    notice: Option<NoticeHandler>,
}

struct ActiveMatch {
    machine: TurnStateMachine,
    owner: OwnerId,
}

/// Network client for one player.
pub struct DuelClient<T: Transport> {
    session: NetSession<T>,
    bus: EventBus,
    catalog: Arc<WeaponCatalog>,
    rules: GameConfig,
    mode: ResolutionMode,
    role_id: Option<RoleId>,
    active: Option<ActiveMatch>,
    matches_started: OwnerId,
    handlers: Handlers,
}

impl<T: Transport> DuelClient<T> {
    /// Create a client around an idle session.
    pub fn new(session: NetSession<T>, catalog: Arc<WeaponCatalog>, rules: GameConfig) -> Self {
        Self {
            session,
            bus: EventBus::new(),
            catalog,
            rules,
            mode: ResolutionMode::default(),
            role_id: None,
            active: None,
            matches_started: 0,
            handlers: Handlers::default(),
        }
    }

    /// Resolution mode for matches started from now on.
    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Start connecting.
    pub fn connect(&mut self) {
        self.session.connect();
    }

    /// Close the connection and drop any match.
    pub fn close(&mut self) {
        self.teardown();
        self.session.close();
    }

    /// The session.
    pub fn session(&self) -> &NetSession<T> {
        &self.session
    }

    /// Listener registry.
    pub fn bus(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    /// Role granted by the last accepted battle application.
    pub fn role_id(&self) -> Option<RoleId> {
        self.role_id
    }

    /// Match in progress.
    pub fn active_match(&self) -> Option<&TurnStateMachine> {
        self.active.as_ref().map(|a| &a.machine)
    }

    /// Bus owner id of the match in progress. Listeners registered under it
    /// are removed when the match ends.
    pub fn match_owner(&self) -> Option<OwnerId> {
        self.active.as_ref().map(|a| a.owner)
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    /// Called with `(from, to)` on every phase change.
    pub fn on_phase_changed<F>(&mut self, handler: F)
    where
        F: FnMut(BattlePhase, BattlePhase) + Send + 'static,
    {
        self.handlers.phase_changed = Some(Box::new(handler));
    }

    /// Called with `(role, old, new)` when a combatant's hit points change.
    pub fn on_hit_points_changed<F>(&mut self, handler: F)
    where
        F: FnMut(RoleId, f64, f64) + Send + 'static,
    {
        self.handlers.hit_points_changed = Some(Box::new(handler));
    }

    /// Called with the winner when a match ends.
    pub fn on_match_ended<F>(&mut self, handler: F)
    where
        F: FnMut(Option<RoleId>) + Send + 'static,
    {
        self.handlers.match_ended = Some(Box::new(handler));
    }

    /// Called with user-visible round problems.
    pub fn on_notice<F>(&mut self, handler: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.handlers.notice = Some(Box::new(handler));
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Queue for a battle with `weapon`.
    pub fn apply_battle(&mut self, weapon: WeaponId) -> Result<(), ClientError> {
        self.catalog
            .get_by_id(weapon)
            .map_err(|e| ClientError::Turn(TurnError::Catalog(e)))?;
        self.session
            .send(&ClientMessage::ApplyBattle(ApplyBattleReq { weapon_type: weapon }))?;
        info!("Applied for battle with weapon {}", weapon);
        Ok(())
    }

    /// Leave the queue.
    pub fn cancel_match(&mut self) -> Result<(), ClientError> {
        self.session.send(&ClientMessage::CancelMatch)?;
        Ok(())
    }

    /// Stage a move for this round.
    pub fn submit_move(&mut self, x: f64, y: f64) -> Result<Vec2, ClientError> {
        let active = self.active.as_mut().ok_or(ClientError::NoMatch)?;
        Ok(active.machine.submit_move(x, y)?)
    }

    /// Face `face_angle_deg` and submit this round's command.
    pub fn submit_attack(&mut self, face_angle_deg: f64) -> Result<Vec<TurnEvent>, ClientError> {
        let active = self.active.as_mut().ok_or(ClientError::NoMatch)?;
        let update = active.machine.submit_attack(face_angle_deg)?;
        let mut events = Vec::new();
        self.dispatch(update, &mut events);
        Ok(events)
    }

    // =========================================================================
    // FRAME
    // =========================================================================

    /// Advance by `dt` seconds. Returns the match events produced, after
    /// they have been passed to the handlers.
    pub fn tick(&mut self, dt: f64) -> Vec<TurnEvent> {
        let mut events = Vec::new();

        for event in self.session.poll(dt) {
            self.bus.publish(&event);
            match event {
                BusEvent::Message(message) => {
                    let update = self.route(&message);
                    self.dispatch(update, &mut events);
                }
                BusEvent::Reconnected => self.resync(),
                BusEvent::Disconnected { reason } => {
                    if self.active.is_some() {
                        warn!("Connection lost mid-match: {}", reason);
                    }
                }
                BusEvent::Connected | BusEvent::LocalError(_) => {}
            }
        }

        if let Some(active) = self.active.as_mut() {
            let update = active.machine.tick(dt);
            self.dispatch(update, &mut events);
        }
        events
    }

    fn route(&mut self, message: &ServerMessage) -> TurnUpdate {
        // A round result settles the round's command even if its 4002 was lost
        if matches!(message, ServerMessage::BattleResult(_)) && self.session.release(OPERATION_REQ) {
            debug!("Round result arrived before the command acknowledgement");
        }

        match message {
            ServerMessage::ApplyBattle(resp) => {
                info!("Battle application accepted as role {}", resp.role_id);
                self.role_id = Some(resp.role_id);
                TurnUpdate::default()
            }
            ServerMessage::MatchResult(_) => self.start_match(message),
            ServerMessage::Operation(resp) if !resp.success => {
                notice("Command rejected by the server")
            }
            ServerMessage::Error(err) => {
                warn!("Request {} failed with error {}", err.req_id, err.error_code);
                notice(&format!("Request {} failed (error {})", err.req_id, err.error_code))
            }
            other if other.affects_match() => match self.active.as_mut() {
                Some(active) => active.machine.handle_message(other),
                None => {
                    debug!("No match for message {}", other.code());
                    TurnUpdate::default()
                }
            },
            _ => TurnUpdate::default(),
        }
    }

    fn start_match(&mut self, message: &ServerMessage) -> TurnUpdate {
        let Some(role) = self.role_id else {
            warn!("Match found before the battle application was accepted");
            return TurnUpdate::default();
        };
        if self.active.is_some() {
            warn!("Match found while another is active, replacing it");
            self.teardown();
            self.role_id = Some(role);
        }

        self.matches_started += 1;
        let mut machine = TurnStateMachine::new(self.catalog.clone(), self.rules.clone(), role, self.mode);
        let update = machine.handle_message(message);
        info!("Match {} started as role {}", self.matches_started, role);
        self.active = Some(ActiveMatch {
            machine,
            owner: self.matches_started,
        });
        update
    }

    fn resync(&mut self) {
        if self.active.is_none() {
            return;
        }
        info!("Reconnected mid-match, requesting battle state");
        if let Err(e) = self.session.send(&ClientMessage::LoadBattleReady) {
            warn!("Resync request failed: {}", e);
        }
    }

    fn dispatch(&mut self, mut update: TurnUpdate, events: &mut Vec<TurnEvent>) {
        for message in std::mem::take(&mut update.outbound) {
            let Err(e) = self.session.send(&message) else { continue };
            warn!("Failed to send {}: {}", message.code(), e);
            if matches!(message, ClientMessage::Operation(_)) {
                update.push(TurnEvent::Notice(format!("Command not sent, submit again: {}", e)));
                if let Some(active) = self.active.as_mut() {
                    update.merge(active.machine.reopen_command());
                }
            } else {
                update.push(TurnEvent::Notice(format!("Request {} not sent: {}", message.code(), e)));
            }
        }

        let handlers = &mut self.handlers;
        for event in &update.events {
            match event {
                TurnEvent::PhaseChanged { from, to } => {
                    if let Some(handler) = handlers.phase_changed.as_mut() {
                        handler(*from, *to);
                    }
                }
                TurnEvent::HitPointsChanged { role, old, new } => {
                    if let Some(handler) = handlers.hit_points_changed.as_mut() {
                        handler(*role, *old, *new);
                    }
                }
                TurnEvent::MatchEnded { winner } => {
                    if let Some(handler) = handlers.match_ended.as_mut() {
                        handler(*winner);
                    }
                }
                TurnEvent::Notice(text) => {
                    warn!("{}", text);
                    if let Some(handler) = handlers.notice.as_mut() {
                        handler(text);
                    }
                }
                TurnEvent::CountdownChanged(_) => {}
            }
        }

        if update.match_ended() {
            self.teardown();
        }
        events.extend(update.events);
    }

    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            let removed = self.bus.unsubscribe_all(active.owner);
            debug!("Match {} torn down, {} listeners removed", active.owner, removed);
        }
        self.role_id = None;
    }
}

fn notice(text: &str) -> TurnUpdate {
    TurnUpdate {
        events: vec![TurnEvent::Notice(text.to_string())],
        outbound: Vec::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
