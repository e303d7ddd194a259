// SPDX-License-Identifier: CEPL-1.0
//! Per-recording-context draw and clear accounting, keyed by the bound
//! depth-stencil resource.

use prism_api::{Resource, Viewport};
use std::collections::HashMap;

/// Draw workload counters. `last_viewport` is whatever viewport was bound
/// when the most recent draw landed.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct DrawStats {
    pub vertices: u64,
    pub draw_calls: u32,
    pub indirect_draw_calls: u32,
    pub last_viewport: Viewport,
}

/// Stats accumulated between two depth clears, captured at the clear.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClearRecord {
    pub stats: DrawStats,
    /// Set when the record came from an implicit flush (depth-stencil switch
    /// on an aliasing backend) rather than an explicit clear.
    pub fullscreen_pass: bool,
}

/// Everything observed about one depth-stencil resource this frame.
#[derive(Clone, Debug, Default)]
pub struct DepthStencilInfo {
    /// Reset once per frame.
    pub total_stats: DrawStats,
    /// Reset on every depth clear of this resource.
    pub current_stats: DrawStats,
    pub clears: Vec<ClearRecord>,
    pub copied_during_frame: bool,
}

/// Accounting state of one recording context (a command list or the
/// immediate context of a queue). Owned by that context's thread until the
/// execute/submit merge point.
#[derive(Clone, Debug)]
pub struct ContextState {
    pub best_copy_stats: DrawStats,
    /// True until the first clear that adopted the previous frame's stats;
    /// inherited through merges so stats recorded before any clear on the
    /// queue are not lost.
    pub first_empty_stats: bool,
    pub current_viewport: Viewport,
    pub current_depth_stencil: Resource,
    pub counters: HashMap<Resource, DepthStencilInfo>,
}

impl Default for ContextState {
    fn default() -> Self {
        ContextState {
            best_copy_stats: DrawStats::default(),
            first_empty_stats: true,
            current_viewport: Viewport::default(),
            current_depth_stencil: Resource::NULL,
            counters: HashMap::new(),
        }
    }
}

impl ContextState {
    /// Full reset, used when the host resets a command list.
    pub fn reset(&mut self) {
        self.reset_on_present();
        self.current_depth_stencil = Resource::NULL;
    }

    /// Frame-boundary reset; the bound depth-stencil carries over.
    pub fn reset_on_present(&mut self) {
        self.best_copy_stats = DrawStats::default();
        self.first_empty_stats = true;
        self.counters.clear();
    }

    /// Folds an executed context's accounting into this one. Summation for
    /// the counters, concatenation for the clear records; the executed
    /// context's bound depth-stencil becomes ours.
    pub fn merge(&mut self, source: &ContextState) {
        self.current_depth_stencil = source.current_depth_stencil;

        if self.first_empty_stats {
            self.first_empty_stats = source.first_empty_stats;
        }

        if source.best_copy_stats.vertices > self.best_copy_stats.vertices {
            self.best_copy_stats = source.best_copy_stats;
        }

        for (&depth_stencil, snapshot) in &source.counters {
            let target = self.counters.entry(depth_stencil).or_default();
            target.total_stats.vertices += snapshot.total_stats.vertices;
            target.total_stats.draw_calls += snapshot.total_stats.draw_calls;
            target.total_stats.indirect_draw_calls += snapshot.total_stats.indirect_draw_calls;
            target.current_stats.vertices += snapshot.current_stats.vertices;
            target.current_stats.draw_calls += snapshot.current_stats.draw_calls;
            target.current_stats.indirect_draw_calls += snapshot.current_stats.indirect_draw_calls;
            target.clears.extend_from_slice(&snapshot.clears);
            target.copied_during_frame |= snapshot.copied_during_frame;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(vertices: u64, draw_calls: u32) -> DrawStats {
        DrawStats {
            vertices,
            draw_calls,
            ..DrawStats::default()
        }
    }

    #[test]
    fn merging_empty_context_changes_nothing() {
        let mut target = ContextState::default();
        target.current_depth_stencil = Resource(3);
        target.counters.insert(
            Resource(3),
            DepthStencilInfo {
                total_stats: stats(100, 2),
                current_stats: stats(100, 2),
                ..DepthStencilInfo::default()
            },
        );
        let before = target.counters[&Resource(3)].clone();

        let empty = ContextState {
            // An executed empty list still propagates its (null) binding
            current_depth_stencil: Resource(3),
            ..ContextState::default()
        };
        target.merge(&empty);

        let after = &target.counters[&Resource(3)];
        assert_eq!(after.total_stats, before.total_stats);
        assert_eq!(after.current_stats, before.current_stats);
        assert_eq!(after.clears.len(), 0);
        assert!(!after.copied_during_frame);
    }

    #[test]
    fn merge_sums_counters_and_concatenates_clears() {
        let mut source = ContextState::default();
        source.counters.insert(
            Resource(7),
            DepthStencilInfo {
                total_stats: stats(300, 3),
                current_stats: stats(100, 1),
                clears: vec![ClearRecord {
                    stats: stats(200, 2),
                    fullscreen_pass: false,
                }],
                copied_during_frame: true,
            },
        );

        let mut target = ContextState::default();
        target.counters.insert(
            Resource(7),
            DepthStencilInfo {
                total_stats: stats(50, 1),
                current_stats: stats(50, 1),
                ..DepthStencilInfo::default()
            },
        );

        target.merge(&source);

        let merged = &target.counters[&Resource(7)];
        assert_eq!(merged.total_stats.vertices, 350);
        assert_eq!(merged.total_stats.draw_calls, 4);
        assert_eq!(merged.current_stats.vertices, 150);
        assert_eq!(merged.clears.len(), 1);
        assert!(merged.copied_during_frame);
    }

    #[test]
    fn merge_inherits_first_empty_flag_and_best_stats() {
        let mut source = ContextState::default();
        source.first_empty_stats = false;
        source.best_copy_stats = stats(500, 5);

        let mut target = ContextState::default();
        assert!(target.first_empty_stats);
        target.merge(&source);
        assert!(!target.first_empty_stats);
        assert_eq!(target.best_copy_stats.vertices, 500);

        // A target that already gave up the flag keeps it
        let fresh = ContextState::default();
        target.merge(&fresh);
        assert!(!target.first_empty_stats);
        // Smaller best stats do not replace larger ones
        assert_eq!(target.best_copy_stats.vertices, 500);
    }

    #[test]
    fn reset_on_present_keeps_binding() {
        let mut state = ContextState::default();
        state.current_depth_stencil = Resource(9);
        state.first_empty_stats = false;
        state.counters.insert(Resource(9), DepthStencilInfo::default());

        state.reset_on_present();
        assert_eq!(state.current_depth_stencil, Resource(9));
        assert!(state.first_empty_stats);
        assert!(state.counters.is_empty());

        state.reset();
        assert!(state.current_depth_stencil.is_null());
    }
}
