//! The authoritative simulation: heterogeneous entity registries, the
//! shared collision index rebuilt once per tick, and pairwise collision
//! dispatch between entity kinds.
//!
//! Mirrors the stable-slot discipline documented on [`EntityRegistry`]:
//! every per-entity update method may reserve or erase, but only
//! [`World::commit`] may promote/free slots, and it runs once per tick
//! before any update method sees the result.

use std::collections::HashMap;

use engine_shared::map::{Map, TileMatrix, AIR_CHAR};
use engine_shared::math::{Direction, Team, Vec2};
use engine_shared::registry::{EntityRegistry, Id};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Player {
    pub team: Team,
    pub position: Vec2,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub noclip: bool,
    pub disguised_as: Option<Team>,
    /// Where this player last died, for the snapshot's corpse list. Cleared
    /// on respawn (`alive` going back to `true`).
    pub death_position: Option<Vec2>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            team: Team::default(),
            position: Vec2::default(),
            health: 100,
            max_health: 100,
            alive: true,
            noclip: false,
            disguised_as: None,
            death_position: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Projectile {
    pub team: Team,
    pub position: Vec2,
    pub velocity: Vec2,
    pub owner: Option<Id<Player>>,
    pub damage: i32,
    pub ticks_to_live: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Explosion {
    pub position: Vec2,
    pub radius: i16,
    pub ticks_remaining: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SentryGun {
    pub team: Team,
    pub position: Vec2,
    pub health: i32,
    pub target: Option<Id<Player>>,
    pub fire_cooldown: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Medkit {
    pub position: Vec2,
    pub respawn_ticks_remaining: u32,
    pub available: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ammopack {
    pub position: Vec2,
    pub respawn_ticks_remaining: u32,
    pub available: bool,
}

bitflags::bitflags! {
    /// Names which entity kinds a [`GenericEntity`] collides with, mirroring
    /// the nine kinds in [`EntityRef`] plus itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntityKindFlags: u16 {
        const PLAYER = 1 << 0;
        const PROJECTILE = 1 << 1;
        const EXPLOSION = 1 << 2;
        const SENTRY_GUN = 1 << 3;
        const MEDKIT = 1 << 4;
        const AMMOPACK = 1 << 5;
        const GENERIC_ENTITY = 1 << 6;
        const FLAG = 1 << 7;
        const PAYLOAD_CART = 1 << 8;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericEntity {
    pub position: Vec2,
    pub velocity: Vec2,
    pub visible: bool,
    /// Local tile shape, offset by `position`; non-air cells occupy the
    /// collision map.
    pub shape: TileMatrix<char>,
    /// Which entity kinds this one collides with.
    pub solid_against: EntityKindFlags,
    /// Which side was blocked on the last `step_generic_entities`, if any.
    pub collision_normal: Direction,
}

impl Default for GenericEntity {
    fn default() -> Self {
        Self {
            position: Vec2::default(),
            velocity: Vec2::default(),
            visible: true,
            shape: TileMatrix::default(),
            solid_against: EntityKindFlags::all(),
            collision_normal: Direction::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Flag {
    pub team: Team,
    pub position: Vec2,
    pub home_position: Vec2,
    pub carrier: Option<Id<Player>>,
    pub score: u32,
    /// Counts down to 0 while dropped away from home; reaching 0 sends the
    /// flag back. Reset whenever the flag is picked up or returns home.
    pub return_ticks_remaining: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PayloadCart {
    pub team: Team,
    pub position: Vec2,
    pub track_progress: u32,
    pub track_length: u32,
}

const MEDKIT_RESPAWN_TICKS: u32 = 64 * 10;
const AMMOPACK_RESPAWN_TICKS: u32 = 64 * 10;
const SENTRY_FIRE_PERIOD: u32 = 8;
const SENTRY_DAMAGE: i32 = 8;
const SENTRY_RANGE: i16 = 12;
const TEAM_SWITCH_INTERVAL_TICKS: u32 = 64 * 60 * 10;
const FLAG_RETURN_TICKS: u32 = 64 * 30;
/// A player or cart must be within this Manhattan distance of a flag to
/// pick it up or return it.
const FLAG_PICKUP_RANGE: i32 = 1;

/// Which entity kind an [`EntityRef`] points at. Covers every kind that
/// contributes cells to the collision map. Flags are walked directly by
/// `step_flags` against a freshly-collected player list instead: pickup and
/// return are proximity checks, not pairwise collision dispatch.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef {
    Player(Id<Player>),
    Projectile(Id<Projectile>),
    Explosion(Id<Explosion>),
    SentryGun(Id<SentryGun>),
    Medkit(Id<Medkit>),
    Ammopack(Id<Ammopack>),
    GenericEntity(Id<GenericEntity>),
    PayloadCart(Id<PayloadCart>),
}

/// `Vec2 -> occupants` index, cleared and rebuilt every tick right after
/// commit. Collision dispatch only ever looks at entities sharing a cell.
pub type CollisionMap = HashMap<Vec2, Vec<EntityRef>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: u32,
    pub team: Team,
    pub position: Vec2,
    pub health: i32,
    pub alive: bool,
    /// The team an enemy sees this player as, if disguised; `None` for
    /// teammates (who always see the real team) and non-disguised enemies.
    pub appears_as: Option<Team>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileView {
    pub team: Team,
    pub position: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplosionView {
    pub position: Vec2,
    pub radius: i16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryGunView {
    pub team: Team,
    pub position: Vec2,
    pub health: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericEntityView {
    pub position: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpseView {
    pub team: Team,
    pub position: Vec2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagView {
    pub team: Team,
    pub position: Vec2,
    pub carried: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    pub team: Team,
    pub position: Vec2,
    pub track_progress: u32,
    pub track_length: u32,
}

/// A value-type view of the world from one player's perspective, ready to
/// serialize into a `Snapshot` message. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub self_player: Option<PlayerView>,
    pub players: Vec<PlayerView>,
    pub projectiles: Vec<ProjectileView>,
    pub explosions: Vec<ExplosionView>,
    pub sentry_guns: Vec<SentryGunView>,
    pub medkits_available: Vec<Vec2>,
    pub ammopacks_available: Vec<Vec2>,
    pub flags: Vec<FlagView>,
    pub carts: Vec<CartView>,
    pub generic_entities: Vec<GenericEntityView>,
    pub corpses: Vec<CorpseView>,
}

/// The deterministic simulation: every entity registry, the collision
/// index, map, and round timers.
pub struct World {
    pub players: EntityRegistry<Player>,
    pub projectiles: EntityRegistry<Projectile>,
    pub explosions: EntityRegistry<Explosion>,
    pub sentry_guns: EntityRegistry<SentryGun>,
    pub medkits: EntityRegistry<Medkit>,
    pub ammopacks: EntityRegistry<Ammopack>,
    pub generic_entities: EntityRegistry<GenericEntity>,
    pub flags: EntityRegistry<Flag>,
    pub carts: EntityRegistry<PayloadCart>,

    collision_map: CollisionMap,
    tick_count: u64,
    map_time_ticks: u64,
}

impl World {
    pub fn new() -> Self {
        Self {
            players: EntityRegistry::new(),
            projectiles: EntityRegistry::new(),
            explosions: EntityRegistry::new(),
            sentry_guns: EntityRegistry::new(),
            medkits: EntityRegistry::new(),
            ammopacks: EntityRegistry::new(),
            generic_entities: EntityRegistry::new(),
            flags: EntityRegistry::new(),
            carts: EntityRegistry::new(),
            collision_map: CollisionMap::new(),
            tick_count: 0,
            map_time_ticks: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Seeds the medkit/ammopack/flag/cart registries from a loaded map.
    /// Call once after `Map::load`, before the first `update`.
    pub fn populate_from_map(&mut self, map: &Map) {
        for &position in map.medkit_spawns() {
            let (_, medkit) = self.medkits.reserve();
            *medkit = Medkit { position, respawn_ticks_remaining: 0, available: true };
        }
        for &position in map.ammopack_spawns() {
            let (_, ammopack) = self.ammopacks.reserve();
            *ammopack = Ammopack { position, respawn_ticks_remaining: 0, available: true };
        }
        for &position in map.red_flag_spawns() {
            let (_, flag) = self.flags.reserve();
            *flag = Flag { team: Team::Red, position, home_position: position, carrier: None, score: 0, return_ticks_remaining: 0 };
        }
        for &position in map.blue_flag_spawns() {
            let (_, flag) = self.flags.reserve();
            *flag = Flag { team: Team::Blue, position, home_position: position, carrier: None, score: 0, return_ticks_remaining: 0 };
        }
        let red_path = map.red_cart_path();
        let (_, cart) = self.carts.reserve();
        *cart = PayloadCart {
            team: Team::Red,
            position: map.red_cart_spawn(),
            track_progress: 0,
            track_length: red_path.len() as u32,
        };
        let blue_path = map.blue_cart_path();
        let (_, cart) = self.carts.reserve();
        *cart = PayloadCart {
            team: Team::Blue,
            position: map.blue_cart_spawn(),
            track_progress: 0,
            track_length: blue_path.len() as u32,
        };
        self.commit();
    }

    /// Promotes every reserved slot and frees every erased id, in the
    /// fixed order the per-category updates assume. The only point where
    /// registry iterators may be invalidated.
    pub fn commit(&mut self) {
        self.players.commit();
        self.projectiles.commit();
        self.explosions.commit();
        self.sentry_guns.commit();
        self.medkits.commit();
        self.ammopacks.commit();
        self.generic_entities.commit();
        self.flags.commit();
        self.carts.commit();
    }

    /// One fixed-timestep tick: commit, rebuild the collision map, run
    /// every category's per-entity update, resolve collisions, then
    /// advance round timers.
    pub fn update(&mut self, map: &Map) {
        self.tick_count += 1;
        self.map_time_ticks += 1;

        self.commit();
        self.rebuild_collision_map();

        self.step_projectiles(map);
        self.step_explosions();
        self.step_sentries(map);
        self.step_medkits();
        self.step_ammopacks();
        self.step_generic_entities(map);
        self.step_flags();
        self.step_carts(map);
        self.resolve_collisions();

        if self.map_time_ticks % TEAM_SWITCH_INTERVAL_TICKS as u64 == 0 {
            self.switch_teams();
        }
    }

    fn rebuild_collision_map(&mut self) {
        self.collision_map.clear();
        for (id, player) in self.players.live() {
            if player.alive {
                self.collision_map.entry(player.position).or_default().push(EntityRef::Player(id));
            }
        }
        for (id, projectile) in self.projectiles.live() {
            self.collision_map.entry(projectile.position).or_default().push(EntityRef::Projectile(id));
        }
        for (id, sentry) in self.sentry_guns.live() {
            self.collision_map.entry(sentry.position).or_default().push(EntityRef::SentryGun(id));
        }
        for (id, medkit) in self.medkits.live() {
            if medkit.available {
                self.collision_map.entry(medkit.position).or_default().push(EntityRef::Medkit(id));
            }
        }
        for (id, ammopack) in self.ammopacks.live() {
            if ammopack.available {
                self.collision_map.entry(ammopack.position).or_default().push(EntityRef::Ammopack(id));
            }
        }
        for (id, explosion) in self.explosions.live() {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let cell = Vec2::new(explosion.position.x + dx, explosion.position.y + dy);
                    self.collision_map.entry(cell).or_default().push(EntityRef::Explosion(id));
                }
            }
        }
        for (id, entity) in self.generic_entities.live() {
            for y in 0..entity.shape.height() {
                for x in 0..entity.shape.width() {
                    if entity.shape.get_or(x, y, AIR_CHAR) == AIR_CHAR {
                        continue;
                    }
                    let cell = Vec2::new(entity.position.x + x as i16, entity.position.y + y as i16);
                    self.collision_map.entry(cell).or_default().push(EntityRef::GenericEntity(id));
                }
            }
        }
        for (id, cart) in self.carts.live() {
            self.collision_map.entry(cart.position).or_default().push(EntityRef::PayloadCart(id));
        }
    }

    fn resolve_collisions(&mut self) {
        let cells: Vec<Vec<EntityRef>> = self.collision_map.values().cloned().collect();
        for occupants in cells {
            for i in 0..occupants.len() {
                for j in (i + 1)..occupants.len() {
                    self.collide(occupants[i], occupants[j]);
                }
            }
        }
    }

    /// The pairwise dispatch table from the design notes, collapsed into
    /// match arms: each unordered `(kind, kind)` pair appears once, with
    /// both orderings of the tuple routed to the same handler.
    fn collide(&mut self, a: EntityRef, b: EntityRef) {
        match (a, b) {
            (EntityRef::Player(p), EntityRef::Projectile(pr)) | (EntityRef::Projectile(pr), EntityRef::Player(p)) => {
                self.collide_player_projectile(p, pr);
            }
            (EntityRef::Player(p), EntityRef::Medkit(m)) | (EntityRef::Medkit(m), EntityRef::Player(p)) => {
                self.collide_player_medkit(p, m);
            }
            (EntityRef::Player(p), EntityRef::Ammopack(a2)) | (EntityRef::Ammopack(a2), EntityRef::Player(p)) => {
                self.collide_player_ammopack(p, a2);
            }
            _ => {}
        }
    }

    fn collide_player_projectile(&mut self, player_id: Id<Player>, projectile_id: Id<Projectile>) {
        // Re-fetch after every sub-call: an earlier collision this same
        // pass could already have erased either participant.
        let Some(projectile) = self.projectiles.find(projectile_id).copied() else { return };
        let Some(player) = self.players.find(player_id).copied() else { return };
        if !player.alive || player.team == projectile.team {
            return; // not collideable / same team, per can_collide.
        }
        if let Some(owner) = projectile.owner {
            if owner == player_id {
                return;
            }
        }
        if let Some(slot) = self.players.find_mut(player_id) {
            slot.health -= projectile.damage;
            if slot.health <= 0 {
                slot.alive = false;
                slot.death_position = Some(slot.position);
            }
        }
        self.projectiles.erase(projectile_id);
    }

    fn collide_player_medkit(&mut self, player_id: Id<Player>, medkit_id: Id<Medkit>) {
        let Some(player) = self.players.find(player_id).copied() else { return };
        let Some(medkit) = self.medkits.find(medkit_id).copied() else { return };
        if !player.alive || !medkit.available || player.health >= player.max_health {
            return;
        }
        if let Some(slot) = self.players.find_mut(player_id) {
            slot.health = slot.max_health;
        }
        if let Some(slot) = self.medkits.find_mut(medkit_id) {
            slot.available = false;
            slot.respawn_ticks_remaining = MEDKIT_RESPAWN_TICKS;
        }
    }

    fn collide_player_ammopack(&mut self, player_id: Id<Player>, ammopack_id: Id<Ammopack>) {
        let Some(player) = self.players.find(player_id) else { return };
        if !player.alive {
            return;
        }
        let Some(ammopack) = self.ammopacks.find(ammopack_id).copied() else { return };
        if !ammopack.available {
            return;
        }
        if let Some(slot) = self.ammopacks.find_mut(ammopack_id) {
            slot.available = false;
            slot.respawn_ticks_remaining = AMMOPACK_RESPAWN_TICKS;
        }
    }

    fn step_projectiles(&mut self, map: &Map) {
        for (id, slot) in self.projectiles.stable() {
            let Some(projectile) = slot else { continue };
            if projectile.ticks_to_live == 0 {
                *slot = None;
                continue;
            }
            projectile.ticks_to_live -= 1;
            let next = projectile.position + projectile.velocity;
            if map.is_solid(next, false, false) {
                *slot = None;
                continue;
            }
            projectile.position = next;
            let _ = id;
        }
    }

    fn step_explosions(&mut self) {
        for (_, slot) in self.explosions.stable() {
            let Some(explosion) = slot else { continue };
            if explosion.ticks_remaining == 0 {
                *slot = None;
            } else {
                explosion.ticks_remaining -= 1;
            }
        }
    }

    fn step_sentries(&mut self, map: &Map) {
        let targets: Vec<(Id<Player>, Vec2, Team)> =
            self.players.live().filter(|(_, p)| p.alive).map(|(id, p)| (id, p.position, p.team)).collect();

        for (sentry_id, slot) in self.sentry_guns.stable() {
            let Some(sentry) = slot else { continue };
            let nearest = targets
                .iter()
                .filter(|(_, _, team)| *team != sentry.team)
                .filter(|(_, pos, _)| map.line_of_sight(sentry.position, *pos))
                .min_by_key(|(_, pos, _)| sentry.position.manhattan_distance(*pos));

            sentry.target = nearest.map(|(id, ..)| *id);
            let in_range = nearest.is_some_and(|(_, pos, _)| sentry.position.manhattan_distance(*pos) <= SENTRY_RANGE as i32);

            if !in_range {
                sentry.fire_cooldown = 0;
                continue;
            }
            if sentry.fire_cooldown > 0 {
                sentry.fire_cooldown -= 1;
                continue;
            }
            sentry.fire_cooldown = SENTRY_FIRE_PERIOD;
            if let Some(target_id) = sentry.target {
                damage_player(&mut self.players, target_id, SENTRY_DAMAGE);
            }
            let _ = sentry_id;
        }
    }

    fn step_medkits(&mut self) {
        for (_, slot) in self.medkits.stable() {
            let Some(medkit) = slot else { continue };
            if !medkit.available && medkit.respawn_ticks_remaining > 0 {
                medkit.respawn_ticks_remaining -= 1;
                if medkit.respawn_ticks_remaining == 0 {
                    medkit.available = true;
                }
            }
        }
    }

    fn step_ammopacks(&mut self) {
        for (_, slot) in self.ammopacks.stable() {
            let Some(ammopack) = slot else { continue };
            if !ammopack.available && ammopack.respawn_ticks_remaining > 0 {
                ammopack.respawn_ticks_remaining -= 1;
                if ammopack.respawn_ticks_remaining == 0 {
                    ammopack.available = true;
                }
            }
        }
    }

    /// Steps every generic entity along its velocity with a Bresenham
    /// sub-stepper (see [`bresenham_move`]), recording the collision normal
    /// of whichever sub-step was blocked, if any.
    fn step_generic_entities(&mut self, map: &Map) {
        for (_, slot) in self.generic_entities.stable() {
            let Some(entity) = slot else { continue };
            if entity.velocity == Vec2::default() {
                entity.collision_normal = Direction::empty();
                continue;
            }
            let (position, normal) = bresenham_move(entity.position, entity.velocity, |p| map.is_solid(p, false, false));
            entity.position = position;
            entity.collision_normal = normal;
        }
    }

    fn step_flags(&mut self) {
        let carriers: Vec<(Id<Player>, Vec2, Team, bool)> =
            self.players.live().map(|(id, p)| (id, p.position, p.team, p.alive)).collect();

        for (_, slot) in self.flags.stable() {
            let Some(flag) = slot else { continue };

            if let Some(carrier_id) = flag.carrier {
                match carriers.iter().find(|(id, ..)| *id == carrier_id) {
                    Some((_, position, _, true)) => {
                        flag.position = *position;
                        continue;
                    }
                    _ => {
                        // Carrier died or disconnected: drop in place and
                        // start the return timer.
                        flag.carrier = None;
                        flag.return_ticks_remaining = FLAG_RETURN_TICKS;
                    }
                }
            }

            let at_home = flag.position == flag.home_position;
            if !at_home {
                if flag.return_ticks_remaining > 0 {
                    flag.return_ticks_remaining -= 1;
                    if flag.return_ticks_remaining == 0 {
                        flag.position = flag.home_position;
                    }
                }
                // A teammate standing on a dropped flag returns it immediately.
                let teammate_nearby = carriers
                    .iter()
                    .any(|(_, pos, team, alive)| *alive && *team == flag.team && pos.manhattan_distance(flag.position) <= FLAG_PICKUP_RANGE);
                if teammate_nearby {
                    flag.position = flag.home_position;
                    flag.return_ticks_remaining = 0;
                }
                continue;
            }

            // At home: any living enemy standing near it picks it up.
            if let Some((carrier_id, ..)) =
                carriers.iter().find(|(_, pos, team, alive)| *alive && *team != flag.team && pos.manhattan_distance(flag.position) <= FLAG_PICKUP_RANGE)
            {
                flag.carrier = Some(*carrier_id);
                flag.return_ticks_remaining = 0;
            }
        }
    }

    fn step_carts(&mut self, map: &Map) {
        let occupants: Vec<(Vec2, Team)> = self.players.live().filter(|(_, p)| p.alive).map(|(_, p)| (p.position, p.team)).collect();

        for (_, slot) in self.carts.stable() {
            let Some(cart) = slot else { continue };
            let path = match cart.team {
                Team::Red => map.red_cart_path(),
                Team::Blue => map.blue_cart_path(),
            };
            if cart.track_progress as usize >= path.len() {
                continue;
            }

            let owner_present = occupants.iter().any(|(pos, team)| *team == cart.team && *pos == cart.position);
            let enemy_present = occupants.iter().any(|(pos, team)| *team != cart.team && *pos == cart.position);
            if !owner_present || enemy_present {
                continue;
            }

            cart.position = path[cart.track_progress as usize];
            cart.track_progress += 1;
        }
    }

    fn switch_teams(&mut self) {
        for (_, slot) in self.players.stable() {
            if let Some(player) = slot {
                player.team = player.team.opposite();
            }
        }
    }

    /// Attempts to move a player one step in `direction`. Tries the full
    /// diagonal first; on block, falls back to horizontal-only then
    /// vertical-only; refuses the step if both sub-moves are blocked.
    pub fn try_move_player(&mut self, player_id: Id<Player>, map: &Map, direction: Direction) -> bool {
        let Some(player) = self.players.find(player_id).copied() else { return false };
        if player.noclip {
            if let Some(slot) = self.players.find_mut(player_id) {
                slot.position = slot.position + delta_for(direction);
            }
            return true;
        }

        let red = player.team == Team::Red;
        let blue = player.team == Team::Blue;
        let can_move = |p: Vec2, dir: Direction| -> bool { !map.is_solid_in_direction(p, red, blue, dir) };

        let full_delta = delta_for(direction);
        let full_target = player.position + full_delta;
        if can_move(full_target, direction) {
            if let Some(slot) = self.players.find_mut(player_id) {
                slot.position = full_target;
            }
            return true;
        }

        let horizontal = direction & (Direction::LEFT | Direction::RIGHT);
        if !horizontal.is_empty() {
            let target = player.position + delta_for(horizontal);
            if can_move(target, horizontal) {
                if let Some(slot) = self.players.find_mut(player_id) {
                    slot.position = target;
                }
                return true;
            }
        }

        let vertical = direction & (Direction::UP | Direction::DOWN);
        if !vertical.is_empty() {
            let target = player.position + delta_for(vertical);
            if can_move(target, vertical) {
                if let Some(slot) = self.players.find_mut(player_id) {
                    slot.position = target;
                }
                return true;
            }
        }

        false
    }

    /// Builds a value-type view of the world for one player, or a
    /// spectator-style view of everything if `viewer` is `None`.
    pub fn take_snapshot(&self, viewer: Option<Id<Player>>) -> WorldSnapshot {
        let viewer_team = viewer.and_then(|id| self.players.find(id)).map(|p| p.team);

        let players: Vec<PlayerView> = self
            .players
            .live()
            .map(|(id, p)| {
                let appears_as = match (viewer_team, p.disguised_as) {
                    (Some(vt), Some(disguise)) if vt != p.team => Some(disguise),
                    _ => None,
                };
                PlayerView {
                    id: id.index(),
                    team: p.team,
                    position: p.position,
                    health: p.health,
                    alive: p.alive,
                    appears_as,
                }
            })
            .collect();

        let self_player = viewer.and_then(|id| self.players.find(id)).map(|p| PlayerView {
            id: viewer.unwrap().index(),
            team: p.team,
            position: p.position,
            health: p.health,
            alive: p.alive,
            appears_as: None,
        });

        WorldSnapshot {
            tick: self.tick_count,
            self_player,
            players,
            projectiles: self
                .projectiles
                .live()
                .map(|(_, p)| ProjectileView { team: p.team, position: p.position })
                .collect(),
            explosions: self
                .explosions
                .live()
                .map(|(_, e)| ExplosionView { position: e.position, radius: e.radius })
                .collect(),
            sentry_guns: self
                .sentry_guns
                .live()
                .map(|(_, s)| SentryGunView { team: s.team, position: s.position, health: s.health })
                .collect(),
            medkits_available: self.medkits.live().filter(|(_, m)| m.available).map(|(_, m)| m.position).collect(),
            ammopacks_available: self.ammopacks.live().filter(|(_, a)| a.available).map(|(_, a)| a.position).collect(),
            flags: self
                .flags
                .live()
                .map(|(_, f)| FlagView { team: f.team, position: f.position, carried: f.carrier.is_some(), score: f.score })
                .collect(),
            carts: self
                .carts
                .live()
                .map(|(_, c)| CartView { team: c.team, position: c.position, track_progress: c.track_progress, track_length: c.track_length })
                .collect(),
            generic_entities: self
                .generic_entities
                .live()
                .filter(|(_, e)| e.visible)
                .map(|(_, e)| GenericEntityView { position: e.position })
                .collect(),
            corpses: self
                .players
                .live()
                .filter(|(_, p)| !p.alive)
                .filter_map(|(_, p)| p.death_position.map(|position| CorpseView { team: p.team, position }))
                .collect(),
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

fn damage_player(players: &mut EntityRegistry<Player>, id: Id<Player>, amount: i32) {
    if let Some(player) = players.find_mut(id) {
        player.health -= amount;
        if player.health <= 0 {
            player.alive = false;
            player.death_position = Some(player.position);
        }
    }
}

/// Steps `start` toward `start + velocity` using the same sub-step
/// apportionment as `Map::line_of_sight`, checking `blocked` before
/// committing each axis's sub-step. Stops at the first blocked sub-step and
/// reports which side(s) blocked it; otherwise walks all the way to the
/// destination.
fn bresenham_move(start: Vec2, velocity: Vec2, mut blocked: impl FnMut(Vec2) -> bool) -> (Vec2, Direction) {
    if velocity == Vec2::default() {
        return (start, Direction::empty());
    }
    let destination = start + velocity;
    let dx = (destination.x as i32 - start.x as i32).abs();
    let dy = (destination.y as i32 - start.y as i32).abs();
    let sx: i16 = if start.x < destination.x { 1 } else { -1 };
    let sy: i16 = if start.y < destination.y { 1 } else { -1 };

    let mut position = start;
    let mut err = if dx > dy { dx } else { -dy } / 2;
    while position != destination {
        let error = err;
        let try_x = error > -dx;
        let try_y = error < dy;

        let mut normal = Direction::empty();
        if try_x {
            let candidate = Vec2::new(position.x + sx, position.y);
            if blocked(candidate) {
                normal |= if sx < 0 { Direction::LEFT } else { Direction::RIGHT };
            } else {
                position.x += sx;
                err -= dy;
            }
        }
        if try_y {
            let candidate = Vec2::new(position.x, position.y + sy);
            if blocked(candidate) {
                normal |= if sy < 0 { Direction::UP } else { Direction::DOWN };
            } else {
                position.y += sy;
                err += dx;
            }
        }
        if !normal.is_empty() {
            return (position, normal);
        }
    }
    (position, Direction::empty())
}

fn delta_for(direction: Direction) -> Vec2 {
    let mut delta = Vec2::default();
    if direction.has_up() {
        delta.y -= 1;
    }
    if direction.has_down() {
        delta.y += 1;
    }
    if direction.has_left() {
        delta.x -= 1;
    }
    if direction.has_right() {
        delta.x += 1;
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_map() -> Map {
        let text = "[DATA]\n   \n   \n   \n[END_DATA]\n[RESOURCES]\n[END_RESOURCES]\n[SCRIPT]\n[END_SCRIPT]\n";
        Map::load("tiny".to_string(), text).unwrap()
    }

    #[test]
    fn commit_barrier_hides_reserved_entities_until_committed() {
        let mut world = World::new();
        let (id, player) = world.players.reserve();
        player.team = Team::Red;
        assert!(world.players.find(id).is_none());
        world.commit();
        assert!(world.players.find(id).is_some());
    }

    #[test]
    fn projectile_damages_enemy_player_on_same_cell() {
        let mut world = World::new();
        let map = tiny_map();

        let (player_id, player) = world.players.reserve();
        player.team = Team::Red;
        player.position = Vec2::new(1, 1);
        player.health = 100;
        player.max_health = 100;
        player.alive = true;

        let (_, projectile) = world.projectiles.reserve();
        projectile.team = Team::Blue;
        projectile.position = Vec2::new(1, 1);
        projectile.damage = 40;
        projectile.ticks_to_live = 10;

        world.update(&map);

        let player = world.players.find(player_id).unwrap();
        assert_eq!(player.health, 60);
        assert_eq!(world.projectiles.len(), 0);
    }

    #[test]
    fn medkit_heals_then_goes_unavailable_until_it_respawns() {
        let mut world = World::new();
        let map = tiny_map();

        let (player_id, player) = world.players.reserve();
        player.position = Vec2::new(1, 1);
        player.health = 10;
        player.max_health = 100;
        player.alive = true;

        let (medkit_id, medkit) = world.medkits.reserve();
        medkit.position = Vec2::new(1, 1);
        medkit.available = true;

        world.update(&map);

        assert_eq!(world.players.find(player_id).unwrap().health, 100);
        assert!(!world.medkits.find(medkit_id).unwrap().available);
    }

    #[test]
    fn blocked_diagonal_falls_back_to_horizontal_substep() {
        let mut world = World::new();
        let text = "[DATA]\n  \n # \n  \n[END_DATA]\n[RESOURCES]\n[END_RESOURCES]\n[SCRIPT]\n[END_SCRIPT]\n";
        let map = Map::load("corner".to_string(), text).unwrap();

        let (player_id, player) = world.players.reserve();
        player.position = Vec2::new(0, 0);
        world.commit();

        let moved = world.try_move_player(player_id, &map, Direction::RIGHT | Direction::DOWN);
        assert!(moved);
        // (1,1) is solid, so only the horizontal sub-step should land.
        assert_eq!(world.players.find(player_id).unwrap().position, Vec2::new(1, 0));
    }

    #[test]
    fn enemy_standing_on_home_flag_picks_it_up_and_it_follows_them() {
        let mut world = World::new();
        let map = tiny_map();

        let (player_id, player) = world.players.reserve();
        player.team = Team::Blue;
        player.position = Vec2::new(1, 1);
        player.alive = true;

        let (flag_id, flag) = world.flags.reserve();
        flag.team = Team::Red;
        flag.position = Vec2::new(1, 1);
        flag.home_position = Vec2::new(1, 1);
        world.commit();

        world.update(&map);
        let flag = world.flags.find(flag_id).unwrap();
        assert_eq!(flag.carrier, Some(player_id));

        // Move the carrier; the flag should follow on the next tick.
        world.players.find_mut(player_id).unwrap().position = Vec2::new(1, 0);
        world.update(&map);
        assert_eq!(world.flags.find(flag_id).unwrap().position, Vec2::new(1, 0));
    }

    #[test]
    fn dropped_flag_returns_home_once_the_return_timer_elapses() {
        let mut world = World::new();
        let map = tiny_map();

        let (flag_id, flag) = world.flags.reserve();
        flag.team = Team::Red;
        flag.position = Vec2::new(0, 0);
        flag.home_position = Vec2::new(1, 1);
        flag.return_ticks_remaining = 2;
        world.commit();

        world.update(&map);
        assert_eq!(world.flags.find(flag_id).unwrap().position, Vec2::new(0, 0));
        world.update(&map);
        assert_eq!(world.flags.find(flag_id).unwrap().position, Vec2::new(1, 1));
    }

    #[test]
    fn cart_advances_only_while_its_own_team_occupies_it_and_no_enemy_does() {
        let text = "[DATA]\nCTT\n[END_DATA]\n[RESOURCES]\n[END_RESOURCES]\n[SCRIPT]\n[END_SCRIPT]\n[CART_RED] C\n[TRACK_RED] T\n";
        let map = Map::load("track".to_string(), text).unwrap();
        let path_len = map.red_cart_path().len() as u32;

        let mut world = World::new();
        let (cart_id, cart) = world.carts.reserve();
        cart.team = Team::Red;
        cart.position = map.red_cart_spawn();
        cart.track_progress = 0;
        cart.track_length = path_len;
        world.commit();

        // No one aboard: the cart doesn't move.
        world.update(&map);
        assert_eq!(world.carts.find(cart_id).unwrap().track_progress, 0);

        // An owning-team player steps aboard.
        let (_, player) = world.players.reserve();
        player.team = Team::Red;
        player.position = map.red_cart_spawn();
        player.alive = true;
        world.commit();

        world.update(&map);
        assert_eq!(world.carts.find(cart_id).unwrap().track_progress, 1);
    }

    #[test]
    fn generic_entity_steps_along_velocity_until_blocked_and_reports_normal() {
        let mut world = World::new();
        let text = "[DATA]\n   \n  #\n   \n[END_DATA]\n[RESOURCES]\n[END_RESOURCES]\n[SCRIPT]\n[END_SCRIPT]\n";
        let map = Map::load("corridor".to_string(), text).unwrap();

        let (entity_id, entity) = world.generic_entities.reserve();
        entity.position = Vec2::new(0, 1);
        entity.velocity = Vec2::new(2, 0);
        world.commit();

        world.update(&map);
        let entity = world.generic_entities.find(entity_id).unwrap();
        // (2,1) is solid, so the stepper should have stopped short of it
        // with a RIGHT collision normal.
        assert_eq!(entity.position, Vec2::new(1, 1));
        assert_eq!(entity.collision_normal, Direction::RIGHT);
    }

    #[test]
    fn explosion_and_generic_entity_cells_participate_in_the_collision_map() {
        let mut world = World::new();
        let map = tiny_map();

        let (_, explosion) = world.explosions.reserve();
        explosion.position = Vec2::new(1, 1);
        explosion.ticks_remaining = 5;

        let (_, entity) = world.generic_entities.reserve();
        entity.position = Vec2::new(0, 0);
        entity.shape = TileMatrix::from_str("#", ' ');
        world.commit();

        world.update(&map);

        let explosion_cells =
            world.collision_map.values().flatten().filter(|r| matches!(r, EntityRef::Explosion(_))).count();
        assert_eq!(explosion_cells, 9);

        let generic_cells =
            world.collision_map.values().flatten().filter(|r| matches!(r, EntityRef::GenericEntity(_))).count();
        assert_eq!(generic_cells, 1);
    }
}
