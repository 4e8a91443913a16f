//! Auto Player
//!
//! Command choice for the headless client: step toward the range where the
//! opponent sits mid-ring of our weapon, then face so the sector is centered
//! on the opponent.

use crate::core::vec2::Vec2;
use crate::game::geometry::normalize_degrees;
use crate::game::state::BattlePhase;
use crate::game::weapon::AttackSector;
use crate::network::client::{ClientError, DuelClient};
use crate::network::transport::Transport;

/// Facing that centers `sector` on `target` when attacking from `from`.
///
/// The sector covers `[start - facing, end - facing]`, so the facing is the
/// sector's middle angle minus the bearing to the target.
pub fn aim(from: Vec2, target: Vec2, sector: &AttackSector) -> f64 {
    let bearing = (target - from).angle_deg();
    let middle = (sector.start_angle_deg + sector.end_angle_deg) / 2.0;
    normalize_degrees(middle - bearing)
}

/// Point on the line to `target` at `range` from it. Backs off when closer
/// than `range`.
pub fn approach(from: Vec2, target: Vec2, range: f64) -> Vec2 {
    let offset = target - from;
    from + offset.normalize() * (offset.length() - range)
}

/// Submit this round's command if one is due. Returns true if a command
/// was sent.
pub fn play_round<T: Transport>(client: &mut DuelClient<T>) -> Result<bool, ClientError> {
    let Some(machine) = client.active_match() else {
        return Ok(false);
    };
    if machine.phase() != BattlePhase::WaitCommand || !machine.input_enabled() {
        return Ok(false);
    }
    let (Some(me), Some(them)) = (machine.local(), machine.opponent()) else {
        return Ok(false);
    };

    let sector = machine.weapon_of(me.id)?.sector.scaled(machine.rules().base_number);
    let range = (sector.inner_radius + sector.outer_radius) / 2.0;
    let target = them.position;
    let step = approach(me.position, target, range);

    let destination = client.submit_move(step.x, step.y)?;
    client.submit_attack(aim(destination, target, &sector))?;
    // An unsent command reopens the window
    Ok(client.active_match().is_some_and(|m| m.phase() != BattlePhase::WaitCommand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::geometry::body_rect;
    use crate::game::weapon::test_catalog;

    #[test]
    fn test_aim_centers_sector_on_target() {
        let blade = test_catalog().get_by_id(0).unwrap().sector.scaled(35.0);
        let target = Vec2::new(0.0, 40.0);

        let facing = aim(Vec2::ZERO, target, &blade);
        assert!((facing - 315.0).abs() < 1e-9);
        assert!(blade.hits(Vec2::ZERO, facing, &body_rect(target, 35.0, 35.0)));
        // Facing the other way misses
        assert!(!blade.hits(Vec2::ZERO, normalize_degrees(facing + 180.0), &body_rect(target, 35.0, 35.0)));
    }

    #[test]
    fn test_approach_and_back_off() {
        let p = approach(Vec2::ZERO, Vec2::new(100.0, 0.0), 30.0);
        assert!((p.x - 70.0).abs() < 1e-9);

        let p = approach(Vec2::ZERO, Vec2::new(10.0, 0.0), 30.0);
        assert!((p.x + 20.0).abs() < 1e-9);

        assert_eq!(approach(Vec2::ZERO, Vec2::ZERO, 30.0), Vec2::ZERO);
    }

    #[test]
    fn test_play_round_submits_once() {
        use crate::config::GameConfig;
        use crate::network::session::{NetSession, SessionConfig};
        use crate::network::transport::mock::MockTransport;
        use crate::network::transport::TransportEvent;
        use std::sync::Arc;
        use std::time::Duration;

        let mock = MockTransport::default();
        let session = NetSession::new(
            mock.clone(),
            SessionConfig { url: "ws://test/ws".into(), reconnect_delay: Duration::from_secs(1) },
        );
        let mut client = DuelClient::new(session, Arc::new(test_catalog()), GameConfig::default());
        assert!(!play_round(&mut client).unwrap());

        client.connect();
        mock.emit(TransportEvent::Opened);
        mock.emit_frame(r#"{"id":2002,"roleId":1,"weaponType":0}"#);
        mock.emit_frame(r#"{"id":10002,"roles":[
            {"roleId":1,"userName":"me","weaponType":0,"x":0,"y":0,"faceAngle":0,"hp":5000},
            {"roleId":2,"userName":"them","weaponType":3,"x":200000,"y":0,"faceAngle":0,"hp":5000}]}"#);
        // Battle start before match result: no match yet
        client.tick(0.0);
        assert!(client.active_match().is_none());

        mock.emit_frame(r#"{"id":10001,"playerInfoList":[{"roleId":1,"weaponType":0},{"roleId":2,"weaponType":3}]}"#);
        mock.emit_frame(r#"{"id":10002,"roles":[
            {"roleId":1,"userName":"me","weaponType":0,"x":0,"y":0,"faceAngle":0,"hp":5000},
            {"roleId":2,"userName":"them","weaponType":3,"x":200000,"y":0,"faceAngle":0,"hp":5000}]}"#);
        client.tick(0.0);
        mock.take_sent();

        assert!(play_round(&mut client).unwrap());
        assert!(!play_round(&mut client).unwrap());

        let frames = mock.take_sent();
        assert_eq!(frames.len(), 1);
        let op: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        // Blade moves its full 105 toward the knife, then aims along +X
        assert_eq!(op["x"], 105000);
        assert_eq!(op["faceAngle"], 45000);
    }
}
