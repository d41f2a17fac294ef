use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::{Ledger, OperatingTurn, ShareInfo, ShareTransfer, Train, TrainPrice};
use crate::{
    catalog::Catalog,
    entity::{Corporation, EntityKey, Holder, PlayerId},
    error::{GameError, GameResult},
    shares::ShareSlot,
};

/// Fallback when no limit was configured for an owner.
pub const DEFAULT_TRAIN_LIMIT: usize = 4;

#[derive(Debug, Clone)]
struct Certificate {
    percent: u32,
    holder: Holder,
    buyable: bool,
}

enum Presidency {
    Keep,
    Set(PlayerId),
    Vacant,
}

/// Self-contained ledger keeping everything in hash maps.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    cash: HashMap<Holder, i64>,
    certificates: BTreeMap<EntityKey, Vec<Certificate>>,
    presidents: HashMap<EntityKey, PlayerId>,
    trains: HashMap<Holder, Vec<Train>>,
    train_limits: HashMap<EntityKey, usize>,
    tokens: BTreeMap<String, Vec<EntityKey>>,
    operations: HashMap<EntityKey, BTreeSet<OperatingTurn>>,
}

impl MemoryLedger {
    /// Empty ledger whose bank starts with `bank_cash`.
    pub fn new(bank_cash: i64) -> Self {
        Self {
            cash: HashMap::from([(Holder::Bank, bank_cash)]),
            certificates: BTreeMap::new(),
            presidents: HashMap::new(),
            trains: HashMap::new(),
            train_limits: HashMap::new(),
            tokens: BTreeMap::new(),
            operations: HashMap::new(),
        }
    }

    /// Ledger seeded with the catalog's bank, corporations, limits and depot.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut ledger = Self::new(catalog.bank_cash);
        for corporation in &catalog.corporations {
            ledger.register_corporation(corporation);
            ledger.set_train_limit(corporation.sym.clone(), catalog.train_limits.major);
        }
        for item in &catalog.items {
            if item.home().is_some() {
                ledger.set_train_limit(item.key().clone(), catalog.train_limits.minor);
            }
        }
        ledger.stock_depot(catalog.depot_trains());
        ledger
    }

    /// Issue every certificate of `corporation` into the IPO.
    pub fn register_corporation(&mut self, corporation: &Corporation) {
        let certificates = corporation
            .shares
            .iter()
            .map(|percent| Certificate {
                percent: *percent,
                holder: Holder::Bank,
                buyable: true,
            })
            .collect();
        self.certificates.insert(corporation.sym.clone(), certificates);
    }

    /// Override the train limit of one owner.
    pub fn set_train_limit(&mut self, owner: EntityKey, limit: usize) {
        self.train_limits.insert(owner, limit);
    }

    /// Add trains to the depot.
    pub fn stock_depot(&mut self, trains: impl IntoIterator<Item = Train>) {
        self.trains.entry(Holder::Bank).or_default().extend(trains);
    }

    fn certificate(&self, slot: &ShareSlot) -> Option<&Certificate> {
        self.certificates.get(&slot.corporation)?.get(slot.index)
    }

    fn certificate_mut(&mut self, slot: &ShareSlot) -> GameResult<&mut Certificate> {
        self.certificates
            .get_mut(&slot.corporation)
            .and_then(|certificates| certificates.get_mut(slot.index))
            .ok_or_else(|| GameError::consistency(format!("unknown share slot {slot}")))
    }

    fn presidency_after(
        &self,
        slot: &ShareSlot,
        percent: u32,
        to: &Holder,
        allow_change: bool,
    ) -> GameResult<Presidency> {
        if slot.is_director() {
            return Ok(match to {
                Holder::Player(player) => Presidency::Set(*player),
                Holder::Bank | Holder::Entity(_) => Presidency::Vacant,
            });
        }

        let Holder::Player(recipient) = to else {
            return Ok(Presidency::Keep);
        };
        let Some(current) = self.presidents.get(&slot.corporation).copied() else {
            return Ok(Presidency::Keep);
        };
        if current == *recipient {
            return Ok(Presidency::Keep);
        }

        let incoming = self.percent_of(to, &slot.corporation) + percent;
        let held = self.percent_of(&Holder::Player(current), &slot.corporation);
        if incoming <= held {
            return Ok(Presidency::Keep);
        }
        if !allow_change {
            return Err(GameError::invalid(format!(
                "transferring {slot} would change the director of {}",
                slot.corporation
            )));
        }
        Ok(Presidency::Set(*recipient))
    }

    fn ensure_funds(&self, holder: &Holder, amount: i64) -> GameResult<()> {
        let available = self.cash(holder);
        if available < amount {
            return Err(GameError::InsufficientFunds {
                required: amount,
                available,
            });
        }
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    fn cash(&self, holder: &Holder) -> i64 {
        self.cash.get(holder).copied().unwrap_or(0)
    }

    fn transfer_cash(&mut self, from: &Holder, to: &Holder, amount: i64) -> GameResult<()> {
        if amount < 0 {
            return Err(GameError::invalid(format!("cannot transfer a negative amount ({amount})")));
        }
        if amount == 0 || from == to {
            return Ok(());
        }
        self.ensure_funds(from, amount)?;
        *self.cash.entry(from.clone()).or_insert(0) -= amount;
        *self.cash.entry(to.clone()).or_insert(0) += amount;
        debug!(%from, %to, amount, "cash transferred");
        Ok(())
    }

    fn share(&self, slot: &ShareSlot) -> Option<ShareInfo> {
        self.certificate(slot).map(|certificate| ShareInfo {
            slot: slot.clone(),
            percent: certificate.percent,
            holder: certificate.holder.clone(),
            buyable: certificate.buyable,
        })
    }

    fn transfer_share(&mut self, slot: &ShareSlot, to: &Holder, transfer: ShareTransfer) -> GameResult<()> {
        let certificate = self
            .certificate(slot)
            .cloned()
            .ok_or_else(|| GameError::consistency(format!("unknown share slot {slot}")))?;
        if !certificate.buyable {
            return Err(GameError::invalid(format!("{slot} is not available for transfer")));
        }
        if certificate.holder == *to {
            return Err(GameError::invalid(format!("{to} already holds {slot}")));
        }
        let presidency = self.presidency_after(slot, certificate.percent, to, transfer.allow_president_change)?;
        if let Some(price) = transfer.price {
            self.ensure_funds(to, price)?;
            self.transfer_cash(to, &certificate.holder, price)?;
        }

        self.certificate_mut(slot)?.holder = to.clone();
        match presidency {
            Presidency::Keep => {}
            Presidency::Set(player) => {
                self.presidents.insert(slot.corporation.clone(), player);
            }
            Presidency::Vacant => {
                self.presidents.remove(&slot.corporation);
            }
        }
        debug!(%slot, %to, "share transferred");
        Ok(())
    }

    fn set_buyable(&mut self, slot: &ShareSlot, buyable: bool) -> GameResult<()> {
        self.certificate_mut(slot)?.buyable = buyable;
        Ok(())
    }

    fn percent_of(&self, holder: &Holder, corporation: &EntityKey) -> u32 {
        self.certificates
            .get(corporation)
            .map(|certificates| {
                certificates
                    .iter()
                    .filter(|certificate| certificate.holder == *holder)
                    .map(|certificate| certificate.percent)
                    .sum()
            })
            .unwrap_or(0)
    }

    fn president_of(&self, corporation: &EntityKey) -> Option<PlayerId> {
        self.presidents.get(corporation).copied()
    }

    fn trains_of(&self, holder: &Holder) -> Vec<Train> {
        self.trains.get(holder).cloned().unwrap_or_default()
    }

    fn train_limit(&self, owner: &EntityKey) -> usize {
        self.train_limits
            .get(owner)
            .copied()
            .unwrap_or(DEFAULT_TRAIN_LIMIT)
    }

    fn transfer_train(&mut self, from: &Holder, to: &Holder, train_id: &str, price: TrainPrice) -> GameResult<()> {
        let position = self
            .trains
            .get(from)
            .and_then(|fleet| fleet.iter().position(|train| train.id == train_id))
            .ok_or_else(|| GameError::invalid(format!("{from} does not hold train {train_id}")))?;
        if let TrainPrice::Paid(amount) = price {
            self.ensure_funds(to, amount)?;
            self.transfer_cash(to, from, amount)?;
        }

        let train = match self.trains.get_mut(from) {
            Some(fleet) => fleet.remove(position),
            None => return Err(GameError::consistency(format!("{from} lost train {train_id}"))),
        };
        debug!(%from, %to, train = %train.name, "train transferred");
        self.trains.entry(to.clone()).or_default().push(train);
        Ok(())
    }

    fn discard_train(&mut self, from: &Holder, train_id: &str) -> GameResult<()> {
        self.transfer_train(from, &Holder::Bank, train_id, TrainPrice::Free)
    }

    fn place_token(&mut self, location: &str, owner: &EntityKey) -> GameResult<()> {
        let tokens = self.tokens.entry(location.to_string()).or_default();
        if tokens.contains(owner) {
            return Err(GameError::invalid(format!("{owner} already has a token in {location}")));
        }
        tokens.push(owner.clone());
        Ok(())
    }

    fn tokens_at(&self, location: &str) -> Vec<EntityKey> {
        self.tokens.get(location).cloned().unwrap_or_default()
    }

    fn replace_token(&mut self, location: &str, from: &EntityKey, to: &EntityKey) -> GameResult<()> {
        let tokens = self
            .tokens
            .get_mut(location)
            .ok_or_else(|| GameError::consistency(format!("no tokens in {location}")))?;
        let index = tokens
            .iter()
            .position(|owner| owner == from)
            .ok_or_else(|| GameError::consistency(format!("{from} has no token in {location}")))?;
        if tokens.contains(to) {
            // One token per owner and city; the surplus one leaves the map.
            tokens.remove(index);
        } else {
            tokens[index] = to.clone();
        }
        Ok(())
    }

    fn record_operation(&mut self, entity: &EntityKey, turn: OperatingTurn) {
        self.operations.entry(entity.clone()).or_default().insert(turn);
    }

    fn operated_in(&self, entity: &EntityKey, turn: OperatingTurn) -> bool {
        self.operations
            .get(entity)
            .map(|turns| turns.contains(&turn))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> MemoryLedger {
        let mut ledger = MemoryLedger::new(1_000);
        ledger.register_corporation(&Corporation::new("BY", "Bayrische Eisenbahn", vec![20, 10, 10, 10]));
        ledger
    }

    fn player(index: usize) -> Holder {
        Holder::Player(PlayerId(index))
    }

    #[test]
    fn cash_transfers_check_funds() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.transfer_cash(&Holder::Bank, &player(0), 300)?;
        assert_eq!(ledger.cash(&player(0)), 300);
        assert_eq!(ledger.cash(&Holder::Bank), 700);

        let err = ledger
            .transfer_cash(&player(0), &Holder::Bank, 301)
            .expect_err("overdraft");
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                required: 301,
                available: 300
            }
        );
        assert_eq!(ledger.cash(&player(0)), 300);
        assert!(ledger.transfer_cash(&player(0), &Holder::Bank, -5).is_err());
        Ok(())
    }

    #[test]
    fn locked_certificates_cannot_move() -> GameResult<()> {
        let mut ledger = ledger();
        let slot = ShareSlot::new("BY", 1);
        ledger.set_buyable(&slot, false)?;
        assert!(ledger.transfer_share(&slot, &player(0), ShareTransfer::grant()).is_err());
        assert_eq!(ledger.share(&slot).map(|info| info.holder), Some(Holder::Bank));

        ledger.set_buyable(&slot, true)?;
        ledger.transfer_share(&slot, &player(0), ShareTransfer::grant())?;
        assert_eq!(ledger.percent_of(&player(0), &"BY".into()), 10);
        Ok(())
    }

    #[test]
    fn director_certificate_sets_president() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.transfer_share(&ShareSlot::director("BY"), &player(0), ShareTransfer::grant())?;
        assert_eq!(ledger.president_of(&"BY".into()), Some(PlayerId(0)));
        Ok(())
    }

    #[test]
    fn president_change_needs_permission() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.transfer_share(&ShareSlot::director("BY"), &player(0), ShareTransfer::grant())?;
        ledger.transfer_share(&ShareSlot::new("BY", 1), &player(1), ShareTransfer::grant())?;
        ledger.transfer_share(&ShareSlot::new("BY", 2), &player(1), ShareTransfer::grant())?;
        assert_eq!(ledger.president_of(&"BY".into()), Some(PlayerId(0)));

        let blocked = ShareTransfer {
            allow_president_change: false,
            price: None,
        };
        let err = ledger
            .transfer_share(&ShareSlot::new("BY", 3), &player(1), blocked)
            .expect_err("would change director");
        assert!(err.is_recoverable());

        ledger.transfer_share(&ShareSlot::new("BY", 3), &player(1), ShareTransfer::grant())?;
        assert_eq!(ledger.president_of(&"BY".into()), Some(PlayerId(1)));
        Ok(())
    }

    #[test]
    fn paid_share_transfer_moves_cash_to_seller() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.transfer_cash(&Holder::Bank, &player(0), 200)?;
        let transfer = ShareTransfer {
            allow_president_change: true,
            price: Some(92),
        };
        ledger.transfer_share(&ShareSlot::new("BY", 1), &player(0), transfer)?;
        assert_eq!(ledger.cash(&player(0)), 108);
        assert_eq!(ledger.cash(&Holder::Bank), 892);
        Ok(())
    }

    #[test]
    fn trains_move_and_return_to_depot() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.stock_depot([Train {
            id: "2-0".into(),
            name: "2".into(),
            price: 80,
        }]);
        ledger.transfer_cash(&Holder::Bank, &Holder::Entity("P1".into()), 100)?;
        ledger.transfer_train(&Holder::Bank, &Holder::Entity("P1".into()), "2-0", TrainPrice::Paid(80))?;
        assert_eq!(ledger.cash(&Holder::Entity("P1".into())), 20);
        assert_eq!(ledger.trains_of(&Holder::Entity("P1".into())).len(), 1);

        ledger.discard_train(&Holder::Entity("P1".into()), "2-0")?;
        assert!(ledger.trains_of(&Holder::Entity("P1".into())).is_empty());
        assert_eq!(ledger.trains_of(&Holder::Bank).len(), 1);
        Ok(())
    }

    #[test]
    fn token_replacement_keeps_location() -> GameResult<()> {
        let mut ledger = ledger();
        ledger.place_token("E19", &"P2".into())?;
        ledger.place_token("E19", &"P5".into())?;
        ledger.replace_token("E19", &"P2".into(), &"PR".into())?;
        assert_eq!(ledger.tokens_at("E19"), vec![EntityKey::from("PR"), EntityKey::from("P5")]);

        ledger.replace_token("E19", &"P5".into(), &"PR".into())?;
        assert_eq!(ledger.tokens_at("E19"), vec![EntityKey::from("PR")]);

        let err = ledger
            .replace_token("H2", &"P1".into(), &"PR".into())
            .expect_err("no token there");
        assert!(err.is_fatal());
        Ok(())
    }

    #[test]
    fn operating_history_is_per_turn() {
        let mut ledger = ledger();
        ledger.record_operation(&"P1".into(), OperatingTurn::new(2, 1));
        assert!(ledger.operated_in(&"P1".into(), OperatingTurn::new(2, 1)));
        assert!(!ledger.operated_in(&"P1".into(), OperatingTurn::new(2, 2)));
        assert!(!ledger.operated_in(&"P3".into(), OperatingTurn::new(2, 1)));
    }
}
