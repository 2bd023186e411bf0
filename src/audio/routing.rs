// Audio Routing - send graph between mixer channels
//
// Sends form a directed acyclic graph. A send that would close a loop is
// rejected, and the render side processes channels in topological order so
// every channel's input is complete before it runs.
//
// Control-side only: this graph is rebuilt into a plain index order before it
// reaches the render engine.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use super::mixer::ChannelId;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Default)]
pub struct SendGraph {
    channels: BTreeSet<ChannelId>,
    /// from -> (to -> amount)
    sends: BTreeMap<ChannelId, BTreeMap<ChannelId, f32>>,
}

impl SendGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&mut self, id: ChannelId) {
        self.channels.insert(id);
    }

    /// Drop a channel with every send into or out of it
    pub fn remove_channel(&mut self, id: ChannelId) {
        self.channels.remove(&id);
        self.sends.remove(&id);
        for targets in self.sends.values_mut() {
            targets.remove(&id);
        }
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.channels.contains(&id)
    }

    /// Create or update a send. `amount` is clamped to [0, 1].
    pub fn set_send(&mut self, from: ChannelId, to: ChannelId, amount: f32) -> EngineResult<()> {
        for id in [from, to] {
            if !self.channels.contains(&id) {
                return Err(EngineError::UnknownChannel(id));
            }
        }
        let exists = self.sends.get(&from).is_some_and(|t| t.contains_key(&to));
        if !exists && self.would_create_cycle(from, to) {
            return Err(EngineError::RoutingCycle { from, to });
        }

        self.sends
            .entry(from)
            .or_default()
            .insert(to, amount.clamp(0.0, 1.0));
        Ok(())
    }

    pub fn remove_send(&mut self, from: ChannelId, to: ChannelId) -> bool {
        self.sends
            .get_mut(&from)
            .is_some_and(|targets| targets.remove(&to).is_some())
    }

    pub fn sends_from(&self, from: ChannelId) -> Vec<(ChannelId, f32)> {
        self.sends
            .get(&from)
            .map(|targets| targets.iter().map(|(id, amount)| (*id, *amount)).collect())
            .unwrap_or_default()
    }

    pub fn is_send_target(&self, id: ChannelId) -> bool {
        self.sends.values().any(|targets| targets.contains_key(&id))
    }

    /// A send from -> to closes a loop when `from` is reachable from `to`
    pub fn would_create_cycle(&self, from: ChannelId, to: ChannelId) -> bool {
        let mut visited = HashSet::new();
        self.has_path_dfs(to, from, &mut visited)
    }

    fn has_path_dfs(&self, current: ChannelId, target: ChannelId, visited: &mut HashSet<ChannelId>) -> bool {
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            return false;
        }

        self.sends.get(&current).is_some_and(|targets| {
            targets
                .keys()
                .any(|next| self.has_path_dfs(*next, target, visited))
        })
    }

    /// Kahn's algorithm; ties resolve by ascending channel id
    pub fn topological_order(&self) -> Vec<ChannelId> {
        let mut in_degree: BTreeMap<ChannelId, usize> =
            self.channels.iter().map(|id| (*id, 0)).collect();
        for targets in self.sends.values() {
            for to in targets.keys() {
                if let Some(degree) = in_degree.get_mut(to) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<ChannelId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.channels.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            if let Some(targets) = self.sends.get(&id) {
                for to in targets.keys() {
                    if let Some(degree) = in_degree.get_mut(to) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*to);
                        }
                    }
                }
            }
        }

        order
    }
}
