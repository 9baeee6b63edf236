use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{TpccError, TpccResult};
use crate::kind::TransactionKind;

/// Weighted transaction mix shared by all workers.
///
/// A deck holds every kind as many times as its weight; cards are dealt in a
/// shuffled order and the deck is reshuffled once it runs out, so each full
/// pass realizes the configured ratio exactly.
pub struct MixSequencer {
    weights: [u32; TransactionKind::COUNT],
    deck: Mutex<Deck>,
}

struct Deck {
    cards: Vec<TransactionKind>,
    next: usize,
    rng: SmallRng,
}

impl MixSequencer {
    pub fn new(weights: [u32; TransactionKind::COUNT], seed: u64) -> TpccResult<Self> {
        let cards: Vec<TransactionKind> = TransactionKind::ALL
            .iter()
            .flat_map(|kind| std::iter::repeat(*kind).take(weights[kind.index()] as usize))
            .collect();
        if cards.is_empty() {
            return Err(TpccError::invalid_config(
                "transaction mix needs at least one positive weight",
            ));
        }

        let mut deck = Deck {
            cards,
            next: 0,
            rng: SmallRng::seed_from_u64(seed),
        };
        deck.cards.shuffle(&mut deck.rng);

        Ok(Self {
            weights,
            deck: Mutex::new(deck),
        })
    }

    pub fn weights(&self) -> [u32; TransactionKind::COUNT] {
        self.weights
    }

    pub fn next(&self) -> TransactionKind {
        let mut deck = self.deck.lock();
        if deck.next == deck.cards.len() {
            let Deck { cards, rng, .. } = &mut *deck;
            cards.shuffle(rng);
            deck.next = 0;
        }
        let kind = deck.cards[deck.next];
        deck.next += 1;
        kind
    }
}
