//! Static 1835 data: start packet, corporations, trains and reservations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    entity::{Corporation, DraftItem, DraftKind, MajorCorporation, MinorCorporation, PrivateCompany},
    error::{GameError, GameResult},
    grid::GridPosition,
    ledger::Train,
    shares::{ReservationTable, ShareSlot},
    step::formation::FormationEvent,
};

/// Descriptive metadata for a title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMeta {
    /// Short identifier (e.g. `1835`).
    pub id: String,
    /// Human-readable game title.
    pub title: String,
    /// Optional subtitle/tagline.
    pub subtitle: Option<String>,
    /// Game designer credit.
    pub designer: Option<String>,
    /// Geographic or thematic location.
    pub location: Option<String>,
    /// Smallest supported table.
    pub min_players: usize,
    /// Largest supported table.
    pub max_players: usize,
}

impl GameMeta {
    /// Title used in logs and config errors, e.g. `1835 (Germany)` when a
    /// subtitle is set.
    pub fn display_name(&self) -> String {
        let subtitle = self.subtitle.as_deref().map(str::trim).unwrap_or_default();
        if subtitle.is_empty() {
            self.title.clone()
        } else {
            format!("{} ({subtitle})", self.title)
        }
    }

    /// Whether `count` players can play this title.
    pub fn supports(&self, count: usize) -> bool {
        (self.min_players..=self.max_players).contains(&count)
    }
}

/// Train type with the number of cards in the depot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainType {
    /// Type name, e.g. `4+4`.
    pub name: String,
    /// Depot price.
    pub price: i64,
    /// Number of cards.
    pub count: usize,
}

/// Train limits per entity tier in the opening phases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainLimits {
    /// Limit for minors.
    pub minor: usize,
    /// Limit for corporations, the Prussian included.
    pub major: usize,
}

/// Everything needed to set up a game.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Title metadata.
    pub meta: GameMeta,
    /// Start packet.
    pub items: Vec<DraftItem>,
    /// Share-issuing corporations.
    pub corporations: Vec<Corporation>,
    /// Certificates held back for the formation and mergers.
    pub reservations: ReservationTable,
    /// Train roster in purchase order.
    pub trains: Vec<TrainType>,
    /// Train limits per tier.
    pub train_limits: TrainLimits,
    /// First purchase of these train types fires the paired event.
    pub formation_triggers: Vec<(String, FormationEvent)>,
    /// Cash the bank starts with.
    pub bank_cash: i64,
    /// Starting cash per player count.
    pub starting_cash: BTreeMap<usize, i64>,
}

impl Catalog {
    /// Check that every bundled certificate names an existing slot of a
    /// corporation in this catalog.
    pub fn validate(&self) -> GameResult<()> {
        for item in &self.items {
            let DraftKind::Private(company) = &item.kind else {
                continue;
            };
            let Some(slot) = &company.bundled_share else {
                continue;
            };
            let corporation = self
                .corporations
                .iter()
                .find(|corporation| corporation.sym == slot.corporation)
                .ok_or_else(|| {
                    GameError::consistency(format!("{} bundles {slot} of an unknown corporation", company.sym))
                })?;
            if slot.index >= corporation.shares.len() {
                return Err(GameError::consistency(format!(
                    "{} bundles {slot}, but {} has {} certificates",
                    company.sym,
                    corporation.sym,
                    corporation.shares.len()
                )));
            }
        }
        Ok(())
    }

    /// Starting cash for a table of `players`, if the count is supported.
    pub fn starting_cash_for(&self, players: usize) -> Option<i64> {
        self.starting_cash.get(&players).copied()
    }

    /// Event fired by the first purchase of `train_name`.
    pub fn formation_event(&self, train_name: &str) -> Option<FormationEvent> {
        self.formation_triggers
            .iter()
            .find(|(name, _)| name == train_name)
            .map(|(_, event)| *event)
    }

    /// One [`Train`] card per depot slot, ids numbered per type.
    pub fn depot_trains(&self) -> Vec<Train> {
        self.trains
            .iter()
            .flat_map(|kind| {
                (0..kind.count).map(move |index| Train {
                    id: format!("{}-{index}", kind.name),
                    name: kind.name.clone(),
                    price: kind.price,
                })
            })
            .collect()
    }

    /// The 1835 start packet and Prussian reservations.
    pub fn g1835() -> Self {
        Self {
            meta: GameMeta {
                id: "1835".to_string(),
                title: "1835".to_string(),
                subtitle: None,
                designer: Some("Michael Meier-Bachl".to_string()),
                location: Some("Germany".to_string()),
                min_players: 3,
                max_players: 7,
            },
            items: vec![
                private("NF", "Nürnberg-Fürth", 100, 5, (1, 1), Some(("BY", 2))),
                minor("P1", "Bergisch Märkische Bahn", 80, (2, 1), "H2"),
                private("LD", "Leipzig-Dresdner Bahn", 190, 20, (2, 2), Some(("SX", 0))),
                minor("P2", "Berlin Potsdamer Bahn", 170, (2, 3), "E19"),
                minor("P3", "Magdeburger-Bahn", 80, (3, 1), "F14"),
                minor("P4", "Köln-Mindener Bahn", 160, (3, 2), "G5"),
                DraftItem::new(
                    DraftKind::Major(MajorCorporation {
                        sym: "BY".into(),
                        name: "Bayrische Eisenbahn".to_string(),
                        par_price: 92,
                        director_percent: 20,
                    }),
                    GridPosition { row: 3, column: 3 },
                ),
                private("BB", "Braunschweigische Bahn", 130, 25, (3, 4), None),
                private("HB", "Hannoversche Bahn", 160, 30, (4, 1), None),
                minor("P5", "Berlin Stettiner Bahn", 80, (4, 2), "E19"),
                minor("P6", "Altona Kiel Bahn", 80, (4, 3), "C11"),
                private("OBB", "Ostbayrische Bahn", 120, 10, (4, 4), Some(("BY", 1))),
                private("PB", "Pfalzbahnen", 150, 15, (4, 5), Some(("BY", 3))),
            ],
            corporations: vec![
                Corporation::new("BY", "Bayrische Eisenbahn", vec![20, 10, 10, 10, 10, 10, 10, 10, 10])
                    .with_par(92)
                    .with_home("O15"),
                Corporation::new("SX", "Sächsische Eisenbahn", vec![20, 10, 10, 10, 10, 10, 10, 10, 10])
                    .with_par(88)
                    .with_home("H16"),
                Corporation::new("PR", "Preussische Eisenbahn", vec![10, 10, 10, 10, 10, 10, 10, 10, 5, 5, 5, 5])
                    .with_par(154)
                    .with_home("E19"),
            ],
            reservations: ReservationTable {
                target: "PR".to_string(),
                director_entity: "P2".to_string(),
                director_slot: "PR_0".to_string(),
                entries: [
                    ("HB", "PR_1"),
                    ("BB", "PR_2"),
                    ("P4", "PR_3"),
                    ("P1", "PR_8"),
                    ("P3", "PR_9"),
                    ("P5", "PR_10"),
                    ("P6", "PR_11"),
                ]
                .into_iter()
                .map(|(entity, slot)| (entity.to_string(), slot.to_string()))
                .collect(),
            },
            trains: [
                ("2", 80, 9),
                ("2+2", 120, 4),
                ("3", 180, 4),
                ("3+3", 270, 3),
                ("4", 360, 3),
                ("4+4", 440, 1),
                ("5", 500, 2),
                ("5+5", 600, 1),
                ("6", 600, 2),
                ("6+6", 720, 4),
            ]
            .into_iter()
            .map(|(name, price, count)| TrainType {
                name: name.to_string(),
                price,
                count,
            })
            .collect(),
            train_limits: TrainLimits { minor: 2, major: 4 },
            formation_triggers: vec![
                ("4".to_string(), FormationEvent::OptionalFormation),
                ("4+4".to_string(), FormationEvent::MandatoryFormation),
                ("5".to_string(), FormationEvent::MandatoryMergers),
            ],
            bank_cash: 12_000,
            starting_cash: BTreeMap::from([(3, 600), (4, 475), (5, 390), (6, 340), (7, 310)]),
        }
    }
}

/// Amount in Mark, as printed in the game log.
pub fn format_currency(amount: i64) -> String {
    format!("{amount}M")
}

fn private(
    sym: &str,
    name: &str,
    value: i64,
    revenue: i64,
    (row, column): (u32, u32),
    bundled: Option<(&str, usize)>,
) -> DraftItem {
    DraftItem::new(
        DraftKind::Private(PrivateCompany {
            sym: sym.into(),
            name: name.to_string(),
            value,
            revenue,
            bundled_share: bundled.map(|(corporation, index)| ShareSlot::new(corporation, index)),
        }),
        GridPosition { row, column },
    )
}

fn minor(sym: &str, name: &str, value: i64, (row, column): (u32, u32), home: &str) -> DraftItem {
    DraftItem::new(
        DraftKind::Minor(MinorCorporation {
            sym: sym.into(),
            name: name.to_string(),
            value,
            home: home.to_string(),
        }),
        GridPosition { row, column },
    )
}
