//! Policies choosing one action when several are enabled in the same tick.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AgentConfig, DeliberationKind};
use crate::core::tactic::TacticId;

/// Picks one of the enabled candidates, given in tactic declaration order.
///
/// `candidates` is never empty when called by the agent.
pub trait Deliberation<S>: Send {
    fn choose(&mut self, state: &S, candidates: &[TacticId]) -> Option<TacticId>;
}

/// Deterministic default: the first enabled action.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstEnabled;

impl<S> Deliberation<S> for FirstEnabled {
    fn choose(&mut self, _state: &S, candidates: &[TacticId]) -> Option<TacticId> {
        candidates.first().copied()
    }
}

/// Uniform choice from a seeded generator, reproducible across runs.
#[derive(Debug, Clone)]
pub struct RandomDeliberation {
    rng: StdRng,
}

impl RandomDeliberation {
    pub const DEFAULT_SEED: u64 = 1_287_821;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomDeliberation {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEED)
    }
}

impl<S> Deliberation<S> for RandomDeliberation {
    fn choose(&mut self, _state: &S, candidates: &[TacticId]) -> Option<TacticId> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..candidates.len());
        candidates.get(index).copied()
    }
}

/// Build the policy named by a config.
pub fn from_config<S>(config: &AgentConfig) -> Box<dyn Deliberation<S>> {
    match config.deliberation {
        DeliberationKind::FirstEnabled => Box::new(FirstEnabled),
        DeliberationKind::Random => Box::new(RandomDeliberation::new(config.random_seed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tactic::{Action, Tactic, TacticCombinator, TacticTree};

    fn candidates() -> Vec<TacticId> {
        let tree: TacticTree<(), ()> = Tactic::Combinator(
            TacticCombinator::AnyOf,
            vec![
                Action::new("a").lift(),
                Action::new("b").lift(),
                Action::new("c").lift(),
            ],
        )
        .into();
        tree.enabled_actions(&())
    }

    #[test]
    fn first_enabled_takes_the_head() {
        let candidates = candidates();
        assert_eq!(FirstEnabled.choose(&(), &candidates), candidates.first().copied());
        assert_eq!(Deliberation::<()>::choose(&mut FirstEnabled, &(), &[]), None);
    }

    #[test]
    fn random_choice_is_reproducible_and_in_range() {
        let candidates = candidates();
        let mut left = RandomDeliberation::new(7);
        let mut right = RandomDeliberation::new(7);
        let picks: Vec<Option<TacticId>> =
            (0..32).map(|_| left.choose(&(), &candidates)).collect();
        let again: Vec<Option<TacticId>> =
            (0..32).map(|_| right.choose(&(), &candidates)).collect();
        assert_eq!(picks, again);
        assert!(picks.iter().all(|pick| pick.is_some_and(|id| candidates.contains(&id))));
        assert_eq!(Deliberation::<()>::choose(&mut left, &(), &[]), None);
    }
}
