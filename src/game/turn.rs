//! Turn State Machine
//!
//! Owns both combatants of a match, the round phase and the on-screen
//! countdown. Local input (`submit_move`, `submit_attack`) and server
//! messages (`handle_message`) drive the transitions; `tick` advances the
//! countdown.
//!
//! ## Round flow
//!
//! ```text
//! PREPARE ──BattleStart──▶ WAIT_COMMAND ──attack / countdown 0──▶ ACTION
//!                              ▲                                     │
//!                              │                                     ▼
//!                              └────── round result (both alive) ── WAIT_ACTION
//!                                                                    │
//!                              END ◀── round result (someone down) ──┘
//! ```
//!
//! Every call that can change state returns a [`TurnUpdate`]: the events
//! for the host and the messages to send. Damage never comes from a
//! countdown; in [`ResolutionMode::ServerAuthoritative`] it only comes
//! from round results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::core::vec2::Vec2;
use crate::game::combatant::{Combatant, CombatantError, RoleId};
use crate::game::events::{TurnEvent, TurnUpdate};
use crate::game::geometry::{body_rect, clamp_to_radius};
use crate::game::state::{BattlePhase, Countdown};
use crate::game::weapon::{CatalogError, WeaponCatalog, WeaponId, WeaponParameters};
use crate::network::protocol::{
    BattleResultBroad, ClientMessage, MatchResultBroad, OperationReq, RoleMessage, ServerMessage,
};

/// Who decides damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionMode {
    /// Damage comes from the server's round results. Local hit prediction
    /// is only logged.
    #[default]
    ServerAuthoritative,
    /// Damage comes from local hit tests (offline play).
    Local,
}

/// Turn errors.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// Action not valid in the current phase.
    #[error("{action} not allowed during {phase}")]
    WrongPhase {
        /// Rejected action
        action: &'static str,
        /// Phase at the time
        phase: BattlePhase,
    },

    /// Command already submitted this round.
    #[error("Input is disabled")]
    InputDisabled,

    /// Role not part of this match.
    #[error("Role {0} is not in this match")]
    UnknownRole(RoleId),

    /// Only one combatant present.
    #[error("No opponent assigned")]
    NoOpponent,

    /// Local resolution requested in server-authoritative mode.
    #[error("Local resolution is disabled while the server is authoritative")]
    ServerAuthoritative,

    /// Damage rejected.
    #[error(transparent)]
    Combatant(#[from] CombatantError),

    /// Weapon lookup failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// One predicted or applied hit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitReport {
    /// Attacking role
    pub attacker: RoleId,
    /// Defending role
    pub defender: RoleId,
    /// Damage dealt
    pub damage: f64,
}

/// State of one match, seen from the local player.
pub struct TurnStateMachine {
    catalog: Arc<WeaponCatalog>,
    rules: GameConfig,
    mode: ResolutionMode,
    local_role: RoleId,
    phase: BattlePhase,
    countdown: Countdown,
    input_enabled: bool,
    staged_move: Option<Vec2>,
    submitted: Option<Vec2>,
    combatants: BTreeMap<RoleId, Combatant>,
    round: u32,
    winner: Option<RoleId>,
}

impl TurnStateMachine {
    /// Create a match in PREPARE for the local player `local_role`.
    pub fn new(catalog: Arc<WeaponCatalog>, rules: GameConfig, local_role: RoleId, mode: ResolutionMode) -> Self {
        Self {
            catalog,
            rules,
            mode,
            local_role,
            phase: BattlePhase::Prepare,
            countdown: Countdown::default(),
            input_enabled: false,
            staged_move: None,
            submitted: None,
            combatants: BTreeMap::new(),
            round: 0,
            winner: None,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current phase.
    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    /// Seconds shown on the countdown.
    pub fn countdown(&self) -> u32 {
        self.countdown.remaining()
    }

    /// Can the local player submit a command?
    pub fn input_enabled(&self) -> bool {
        self.input_enabled
    }

    /// Resolution mode.
    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Local player's role id.
    pub fn local_role(&self) -> RoleId {
        self.local_role
    }

    /// Rounds resolved so far.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Winner, once the match has ended with one.
    pub fn winner(&self) -> Option<RoleId> {
        self.winner
    }

    /// Destination staged by `submit_move`.
    pub fn staged_move(&self) -> Option<Vec2> {
        self.staged_move
    }

    /// A combatant by role.
    pub fn combatant(&self, role: RoleId) -> Option<&Combatant> {
        self.combatants.get(&role)
    }

    /// The local player's combatant.
    pub fn local(&self) -> Option<&Combatant> {
        self.combatants.get(&self.local_role)
    }

    /// The other combatant.
    pub fn opponent(&self) -> Option<&Combatant> {
        self.combatants.values().find(|c| c.id != self.local_role)
    }

    /// Game constants for this match.
    pub fn rules(&self) -> &GameConfig {
        &self.rules
    }

    /// Weapon carried by `role`.
    pub fn weapon_of(&self, role: RoleId) -> Result<&WeaponParameters, TurnError> {
        let combatant = self.combatants.get(&role).ok_or(TurnError::UnknownRole(role))?;
        Ok(self.catalog.get_by_id(combatant.weapon_id)?)
    }

    /// World-space move radius of the local player's weapon.
    pub fn move_radius(&self) -> Result<f64, TurnError> {
        let weapon = self.weapon_of(self.local_role)?;
        Ok(weapon.move_radius * self.rules.base_number)
    }

    // =========================================================================
    // LOCAL INPUT
    // =========================================================================

    /// Stage a destination, clamped to the move circle around the current
    /// position. Returns the staged point.
    pub fn submit_move(&mut self, x: f64, y: f64) -> Result<Vec2, TurnError> {
        self.check_input("submit_move")?;
        let origin = self.local().ok_or(TurnError::UnknownRole(self.local_role))?.position;
        let destination = clamp_to_radius(origin, Vec2::new(x, y), self.move_radius()?);
        self.staged_move = Some(destination);
        Ok(destination)
    }

    /// Face `face_angle_deg` and submit this round's command (staged move,
    /// or stay in place). Input stays disabled until the next command window.
    pub fn submit_attack(&mut self, face_angle_deg: f64) -> Result<TurnUpdate, TurnError> {
        self.check_input("submit_attack")?;
        self.local_mut()?.set_facing(face_angle_deg);

        let mut update = TurnUpdate::default();
        self.submit_command(&mut update)?;
        Ok(update)
    }

    /// Reopen the command window after this round's command failed to
    /// reach the server. The submitted destination is staged again. No-op
    /// outside WAIT_ACTION.
    pub fn reopen_command(&mut self) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        if self.phase != BattlePhase::WaitAction {
            return update;
        }
        let staged = self.submitted.take();
        self.enter(BattlePhase::WaitCommand, &mut update);
        self.staged_move = staged;
        update
    }

    fn check_input(&self, action: &'static str) -> Result<(), TurnError> {
        if self.phase != BattlePhase::WaitCommand {
            return Err(TurnError::WrongPhase { action, phase: self.phase });
        }
        if !self.input_enabled {
            return Err(TurnError::InputDisabled);
        }
        Ok(())
    }

    fn submit_command(&mut self, update: &mut TurnUpdate) -> Result<(), TurnError> {
        let scale = self.rules.wire_scale;
        let staged = self.staged_move.take();
        let mode = self.mode;
        let local = self.local_mut()?;

        let destination = staged.unwrap_or(local.position);
        let request = OperationReq::new(local.id, destination, local.facing_deg, scale);
        if mode == ResolutionMode::Local {
            local.move_to(destination);
        }
        debug!("Command: move to {} facing {:.1}", destination, local.facing_deg);

        self.input_enabled = false;
        self.enter(BattlePhase::Action, update);
        if mode == ResolutionMode::ServerAuthoritative {
            self.submitted = Some(destination);
            update.send(ClientMessage::Operation(request));
        }
        self.enter(BattlePhase::WaitAction, update);
        Ok(())
    }

    fn local_mut(&mut self) -> Result<&mut Combatant, TurnError> {
        let role = self.local_role;
        self.combatants.get_mut(&role).ok_or(TurnError::UnknownRole(role))
    }

    // =========================================================================
    // TIME
    // =========================================================================

    /// Advance the countdown by `dt` seconds. On expiry the command window
    /// submits whatever is staged; the action window gives way to the next
    /// command window (or resolves the round in local mode).
    pub fn tick(&mut self, dt: f64) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        if !matches!(self.phase, BattlePhase::WaitCommand | BattlePhase::WaitAction) {
            return update;
        }

        let was_expired = self.countdown.is_expired();
        if self.countdown.advance(dt) > 0 {
            update.push(TurnEvent::CountdownChanged(self.countdown.remaining()));
        }
        if was_expired || !self.countdown.is_expired() {
            return update;
        }

        let phase = self.phase;
        match phase {
            BattlePhase::WaitCommand if self.input_enabled => {
                info!("Command window expired, submitting staged command");
                if let Err(e) = self.submit_command(&mut update) {
                    warn!("Auto-submit failed: {}", e);
                    update.push(TurnEvent::Notice(format!("Could not submit command: {}", e)));
                }
            }
            BattlePhase::WaitAction => match self.mode {
                ResolutionMode::Local => match self.resolve_locally() {
                    Ok(resolved) => update.merge(resolved),
                    Err(e) => update.push(TurnEvent::Notice(format!("Could not resolve round: {}", e))),
                },
                ResolutionMode::ServerAuthoritative => {
                    debug!("Action window expired without a round result");
                    self.enter(BattlePhase::WaitCommand, &mut update);
                }
            },
            _ => {}
        }
        update
    }

    // =========================================================================
    // SERVER MESSAGES
    // =========================================================================

    /// Apply a server message. Messages that do not concern the match, and
    /// anything after END, are ignored.
    pub fn handle_message(&mut self, message: &ServerMessage) -> TurnUpdate {
        if self.phase.is_terminal() {
            debug!("Match over, ignoring message {}", message.code());
            return TurnUpdate::default();
        }

        match message {
            ServerMessage::MatchResult(result) => self.register_players(result),
            ServerMessage::BattleStart(start) => self.assign_roles(&start.roles),
            ServerMessage::BattleResult(result) => self.apply_result(result),
            ServerMessage::BattleState(state) => self.apply_state(state.battle_state),
            _ => TurnUpdate::default(),
        }
    }

    /// Opponent found: create both combatants and report the battle loaded.
    pub fn register_players(&mut self, result: &MatchResultBroad) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        for player in &result.player_info_list {
            if self.combatants.contains_key(&player.role_id) {
                continue;
            }
            self.spawn(player.role_id, player.display_name(), player.weapon_type, Vec2::ZERO, &mut update);
        }

        if self.phase == BattlePhase::Prepare {
            update.send(ClientMessage::LoadBattleReady);
        }
        update
    }

    /// Battle begins: place both roles. Leaves PREPARE once the local player
    /// and an opponent are both present.
    pub fn assign_roles(&mut self, roles: &[RoleMessage]) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        for role in roles {
            self.upsert_role(role, &mut update);
        }

        if self.phase == BattlePhase::Prepare {
            if self.local().is_some() && self.opponent().is_some() {
                info!("Battle start: role {} vs role {:?}", self.local_role, self.opponent().map(|c| c.id));
                self.enter(BattlePhase::WaitCommand, &mut update);
            } else {
                update.push(TurnEvent::Notice("Battle start is missing a combatant".to_string()));
            }
        }
        update
    }

    /// Authoritative phase change.
    pub fn apply_state(&mut self, phase: BattlePhase) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        if phase == BattlePhase::End {
            self.winner = self.winner.or_else(|| self.sole_survivor());
        }
        self.enter(phase, &mut update);
        update
    }

    /// Round result: sync both combatants, then END if someone is down or
    /// a winner was declared, else the next command window.
    pub fn apply_result(&mut self, result: &BattleResultBroad) -> TurnUpdate {
        let mut update = TurnUpdate::default();
        for role in &result.roles {
            self.upsert_role(role, &mut update);
        }

        let reported = |id: RoleId| result.roles.iter().any(|r| r.role_id == id);
        let opponent = self.opponent().map(|c| c.id);
        if !reported(self.local_role) || !opponent.is_some_and(reported) {
            update.push(TurnEvent::Notice("Round result is missing a combatant".to_string()));
        }

        self.round += 1;
        // Knockouts from this round are already synced; they still swung
        if let Ok(predicted) = self.hits(true) {
            debug!("Round {}: local prediction {:?}", self.round, predicted);
        }

        let someone_down = self.combatants.values().any(|c| !c.is_alive());
        if someone_down || result.winner().is_some() {
            self.winner = result.winner().or_else(|| self.sole_survivor());
            self.enter(BattlePhase::End, &mut update);
        } else {
            self.enter(BattlePhase::WaitCommand, &mut update);
        }
        update
    }

    fn spawn(&mut self, role: RoleId, name: &str, weapon: WeaponId, position: Vec2, update: &mut TurnUpdate) -> bool {
        if self.combatants.len() >= 2 {
            warn!("Ignoring third role {}", role);
            update.push(TurnEvent::Notice(format!("Unexpected role {}", role)));
            return false;
        }
        match self.catalog.get_by_id(weapon) {
            Ok(params) => {
                self.combatants.insert(role, Combatant::new(role, name, params, position));
                true
            }
            Err(e) => {
                warn!("Cannot create role {}: {}", role, e);
                update.push(TurnEvent::Notice(format!("Role {} has an unusable weapon: {}", role, e)));
                false
            }
        }
    }

    fn upsert_role(&mut self, role: &RoleMessage, update: &mut TurnUpdate) {
        let scale = self.rules.wire_scale;
        let position = role.position(scale);
        if !self.combatants.contains_key(&role.role_id)
            && !self.spawn(role.role_id, &role.user_name, role.weapon_type, position, update)
        {
            return;
        }

        if let Some(combatant) = self.combatants.get_mut(&role.role_id) {
            let hp = role.hit_points(scale);
            if let Some(old) = combatant.sync_from_wire(position, role.facing_deg(scale), hp) {
                update.push(TurnEvent::HitPointsChanged {
                    role: role.role_id,
                    old,
                    new: combatant.hit_points(),
                });
            }
        }
    }

    // =========================================================================
    // HIT RESOLUTION
    // =========================================================================

    /// Hits each living combatant would land from the current positions and
    /// facings. Pure; both sides may hit in the same round.
    pub fn predict_hits(&self) -> Result<Vec<HitReport>, TurnError> {
        self.hits(false)
    }

    fn hits(&self, include_down: bool) -> Result<Vec<HitReport>, TurnError> {
        let local = self.local().ok_or(TurnError::UnknownRole(self.local_role))?;
        let opponent = self.opponent().ok_or(TurnError::NoOpponent)?;

        let mut hits = Vec::new();
        for (attacker, defender) in [(local, opponent), (opponent, local)] {
            if !include_down && !attacker.is_alive() {
                continue;
            }
            let weapon = self.catalog.get_by_id(attacker.weapon_id)?;
            let base = self.rules.base_number;
            let body = body_rect(defender.position, base, base);
            if weapon.sector.scaled(base).hits(attacker.position, attacker.facing_deg, &body) {
                hits.push(HitReport {
                    attacker: attacker.id,
                    defender: defender.id,
                    damage: weapon.attack_power,
                });
            }
        }
        Ok(hits)
    }

    /// Apply the predicted hits and finish the round. Local mode only.
    pub fn resolve_locally(&mut self) -> Result<TurnUpdate, TurnError> {
        if self.mode == ResolutionMode::ServerAuthoritative {
            return Err(TurnError::ServerAuthoritative);
        }
        if !matches!(self.phase, BattlePhase::Action | BattlePhase::WaitAction) {
            return Err(TurnError::WrongPhase { action: "resolve_locally", phase: self.phase });
        }

        let hits = self.predict_hits()?;
        let mut update = TurnUpdate::default();
        for hit in &hits {
            let defender = self
                .combatants
                .get_mut(&hit.defender)
                .ok_or(TurnError::UnknownRole(hit.defender))?;
            let old = defender.hit_points();
            let new = defender.apply_damage(hit.damage)?;
            if new != old {
                update.push(TurnEvent::HitPointsChanged { role: hit.defender, old, new });
            }
        }

        self.round += 1;
        if self.combatants.values().any(|c| !c.is_alive()) {
            self.winner = self.sole_survivor();
            self.enter(BattlePhase::End, &mut update);
        } else {
            self.enter(BattlePhase::WaitCommand, &mut update);
        }
        Ok(update)
    }

    fn sole_survivor(&self) -> Option<RoleId> {
        let mut alive = self.combatants.values().filter(|c| c.is_alive());
        match (alive.next(), alive.next()) {
            (Some(c), None) => Some(c.id),
            _ => None,
        }
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    fn enter(&mut self, to: BattlePhase, update: &mut TurnUpdate) {
        let from = self.phase;
        self.phase = to;
        if from != to {
            debug!("Phase {} -> {}", from, to);
            update.push(TurnEvent::PhaseChanged { from, to });
        }

        match to {
            BattlePhase::Prepare => {}
            BattlePhase::WaitCommand => {
                self.input_enabled = true;
                self.staged_move = None;
                self.submitted = None;
                self.countdown.reset(self.rules.wait_command_tick);
                update.push(TurnEvent::CountdownChanged(self.countdown.remaining()));
            }
            BattlePhase::Action => {
                self.input_enabled = false;
            }
            BattlePhase::WaitAction => {
                self.input_enabled = false;
                self.countdown.reset(self.rules.wait_action_tick);
                update.push(TurnEvent::CountdownChanged(self.countdown.remaining()));
            }
            BattlePhase::End => {
                self.input_enabled = false;
                self.countdown.reset(0);
                if from != to {
                    info!("Match over after {} rounds, winner {:?}", self.round, self.winner);
                    update.push(TurnEvent::MatchEnded { winner: self.winner });
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
