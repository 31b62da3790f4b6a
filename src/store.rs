//! Double-buffered agent storage.
//!
//! The committed buffer is what readers see; the staging buffer receives the
//! next frame while the committed one stays frozen. [`AgentStore::commit`]
//! swaps them, so no agent can observe another's next-frame state.

use crate::agent::Agent;

#[derive(Clone, Debug, Default)]
pub struct AgentStore {
    current: Vec<Agent>,
    staging: Vec<Agent>,
}

impl AgentStore {
    pub fn new(agents: Vec<Agent>) -> Self {
        let staging = agents.clone();
        Self {
            current: agents,
            staging,
        }
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    /// Committed agent `index`. Panics when out of range.
    pub fn get(&self, index: usize) -> Agent {
        self.current[index]
    }

    /// Overwrites committed agent `index`. Panics when out of range.
    pub fn set(&mut self, index: usize, agent: Agent) {
        self.current[index] = agent;
    }

    pub fn as_slice(&self) -> &[Agent] {
        &self.current
    }

    pub fn iter(&self) -> impl Iterator<Item = &Agent> {
        self.current.iter()
    }

    /// Frozen committed frame and writable staging frame.
    pub(crate) fn split(&mut self) -> (&[Agent], &mut [Agent]) {
        (&self.current, &mut self.staging)
    }

    /// Makes the staging frame current.
    pub(crate) fn commit(&mut self) {
        std::mem::swap(&mut self.current, &mut self.staging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_commit_swaps_buffers() {
        let mut store = AgentStore::new(vec![Agent::prey(Vec3::ZERO, Vec3::X); 3]);
        {
            let (current, staging) = store.split();
            for (slot, agent) in staging.iter_mut().zip(current) {
                *slot = Agent::prey(agent.position + Vec3::ONE, agent.velocity);
            }
            // committed frame is untouched until commit
            assert_eq!(current[0].position, Vec3::ZERO);
        }
        assert_eq!(store.get(0).position, Vec3::ZERO);
        store.commit();
        assert!(store.iter().all(|a| a.position == Vec3::ONE));
    }

    #[test]
    fn test_get_set() {
        let mut store = AgentStore::new(vec![Agent::prey(Vec3::ZERO, Vec3::X); 2]);
        store.set(1, Agent::predator(Vec3::ONE, Vec3::Y));
        assert!(store.get(1).is_predator());
        assert_eq!(store.len(), 2);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_range_panics() {
        let store = AgentStore::new(Vec::new());
        store.get(0);
    }
}
