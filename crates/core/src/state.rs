//! The explicit state object threaded through every step.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    catalog::Catalog,
    entity::{DraftKind, Entities, EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    grid::AuctionGrid,
    ledger::{Ledger, OperatingTurn},
    shares::{ShareReservations, ShareSlot},
    step::formation::FormationState,
};

/// A seated player. Cash lives in the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Seat index.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
}

/// One line of the public game log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was written.
    pub at: DateTime<Utc>,
    /// Human-readable message.
    pub message: String,
}

/// Public, append-only log of everything that happened.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameLog {
    entries: Vec<LogEntry>,
}

impl GameLog {
    /// Append a line.
    pub fn push(&mut self, message: impl Into<String>) {
        self.entries.push(LogEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    /// All lines in order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Messages only, in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.message.as_str())
    }

    /// Most recent message.
    pub fn last(&self) -> Option<&str> {
        self.entries.last().map(|entry| entry.message.as_str())
    }
}

/// Percentage excluded from this round's dividend, per holder and
/// corporation. Each merged certificate adds its own percent, so a 5% share
/// never blocks more than 5%.
#[derive(Debug, Clone, Default)]
pub struct NonPayingShares {
    percent: HashMap<(PlayerId, EntityKey), u32>,
}

impl NonPayingShares {
    /// Exclude a certificate of `percent` of `corporation` held by `player`.
    pub fn exclude(&mut self, player: PlayerId, corporation: &EntityKey, percent: u32) {
        *self.percent.entry((player, corporation.clone())).or_insert(0) += percent;
    }

    /// Excluded percentage.
    pub fn get(&self, player: PlayerId, corporation: &EntityKey) -> u32 {
        self.percent
            .get(&(player, corporation.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// Context that lives for exactly one operating round.
#[derive(Debug, Clone)]
pub struct OperatingRoundState {
    /// Which round this is.
    pub turn: OperatingTurn,
    /// Merged shares that do not pay this round.
    pub non_paying: NonPayingShares,
}

impl OperatingRoundState {
    /// Fresh context for `turn`.
    pub fn new(turn: OperatingTurn) -> Self {
        Self {
            turn,
            non_paying: NonPayingShares::default(),
        }
    }
}

/// Complete rules state of one game session.
pub struct GameState {
    pub(crate) players: Vec<Player>,
    pub(crate) entities: Entities,
    pub(crate) grid: AuctionGrid,
    pub(crate) reservations: ShareReservations,
    pub(crate) formation: FormationState,
    pub(crate) operating: Option<OperatingRoundState>,
    pub(crate) ledger: Box<dyn Ledger>,
    pub(crate) log: GameLog,
}

impl GameState {
    /// Seat `names`, lay out the start packet, lock held-back certificates and
    /// pay out starting cash.
    pub fn new(
        names: Vec<String>,
        catalog: &Catalog,
        mut ledger: Box<dyn Ledger>,
        starting_cash: i64,
    ) -> GameResult<Self> {
        if names.is_empty() {
            return Err(GameError::consistency("a game needs at least one player"));
        }
        let players: Vec<Player> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Player {
                id: PlayerId(index),
                name,
            })
            .collect();

        catalog.validate()?;
        let entities = Entities::new(catalog.items.clone(), catalog.corporations.clone())?;
        let grid = AuctionGrid::from_entities(&entities)?;
        let reservations = ShareReservations::from_table(&catalog.reservations)?;
        reservations.validate_against(entities.corporation(reservations.target())?)?;
        if !entities.contains_item(reservations.director_entity()) {
            return Err(GameError::consistency(format!(
                "formation entity {} is not in the start packet",
                reservations.director_entity()
            )));
        }

        for slot in locked_slots(&entities, &reservations)? {
            if ledger.share(&slot).is_none() {
                return Err(GameError::consistency(format!("ledger has no certificate {slot}")));
            }
            ledger.set_buyable(&slot, false)?;
        }
        for player in &players {
            ledger.transfer_cash(&Holder::Bank, &Holder::Player(player.id), starting_cash)?;
        }

        info!(players = players.len(), starting_cash, "game state initialised");
        Ok(Self {
            players,
            entities,
            grid,
            reservations,
            formation: FormationState::default(),
            operating: None,
            ledger,
            log: GameLog::default(),
        })
    }

    /// Players in seating order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    /// Look up a seated player.
    pub fn player(&self, id: PlayerId) -> GameResult<&Player> {
        self.players
            .get(id.0)
            .ok_or_else(|| GameError::invalid(format!("no player in seat {id}")))
    }

    /// Display name, falling back to the seat number.
    pub fn player_name(&self, id: PlayerId) -> String {
        self.players
            .get(id.0)
            .map(|player| player.name.clone())
            .unwrap_or_else(|| format!("player {id}"))
    }

    /// Every player once, starting with the seat after `anchor` (or seat 0).
    pub fn rotation_after(&self, anchor: Option<PlayerId>) -> Vec<PlayerId> {
        let count = self.players.len();
        let start = anchor
            .and_then(|anchor| self.players.iter().position(|player| player.id == anchor))
            .map(|index| index + 1)
            .unwrap_or(0);
        (0..count)
            .map(|offset| self.players[(start + offset) % count].id)
            .collect()
    }

    /// Draft items and corporations.
    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// Start packet layout.
    pub fn grid(&self) -> &AuctionGrid {
        &self.grid
    }

    /// Items currently on offer in the draft.
    pub fn available(&self) -> Vec<EntityKey> {
        self.grid.available_in(&self.entities)
    }

    /// Reserved-share mapping for the formation and mergers.
    pub fn reservations(&self) -> &ShareReservations {
        &self.reservations
    }

    /// Formation flags.
    pub fn formation(&self) -> &FormationState {
        &self.formation
    }

    /// Context of the running operating round, if any.
    pub fn operating_round(&self) -> Option<&OperatingRoundState> {
        self.operating.as_ref()
    }

    /// Read access to the collaborator.
    pub fn ledger(&self) -> &dyn Ledger {
        self.ledger.as_ref()
    }

    /// Write access to the collaborator, for the host's own subsystems.
    pub fn ledger_mut(&mut self) -> &mut dyn Ledger {
        self.ledger.as_mut()
    }

    /// Public log.
    pub fn log(&self) -> &GameLog {
        &self.log
    }

    /// Cash held by a player.
    pub fn cash_of(&self, player: PlayerId) -> i64 {
        self.ledger.cash(&Holder::Player(player))
    }

    /// Percentage of `corporation` held by `player` that pays nothing this
    /// round; zero outside operating rounds.
    pub fn non_paying_percent(&self, player: PlayerId, corporation: &EntityKey) -> u32 {
        self.operating
            .as_ref()
            .map(|round| round.non_paying.get(player, corporation))
            .unwrap_or(0)
    }

    /// Whether `entity` already ran in the current operating round.
    pub fn operated_this_round(&self, entity: &EntityKey) -> bool {
        self.operating
            .as_ref()
            .map(|round| self.ledger.operated_in(entity, round.turn))
            .unwrap_or(false)
    }

    pub(crate) fn begin_operating_round(&mut self, turn: OperatingTurn) {
        self.operating = Some(OperatingRoundState::new(turn));
    }

    pub(crate) fn end_operating_round(&mut self) {
        self.operating = None;
    }
}

/// Certificates that must stay out of normal trading until the rules hand
/// them out: all of the target corporation, bundled private shares and the
/// director certificates sold in the draft.
fn locked_slots(entities: &Entities, reservations: &ShareReservations) -> GameResult<Vec<ShareSlot>> {
    let mut slots: Vec<ShareSlot> = entities.corporation(reservations.target())?.slots().collect();
    for item in entities.items() {
        match &item.kind {
            DraftKind::Private(company) => slots.extend(company.bundled_share.clone()),
            DraftKind::Major(major) => slots.push(ShareSlot::director(major.sym.clone())),
            DraftKind::Minor(_) => {}
        }
    }
    Ok(slots)
}
