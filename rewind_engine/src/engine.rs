// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The capture/replay context object.

use std::collections::{BTreeMap, VecDeque};

use rewind_core::clock::ReplayClock;
use rewind_core::command::{ApplyError, Command, Packet};
use rewind_core::diag::{CommandStats, PacketSummary};
use rewind_core::id::{NodeId, ProcessId};
use rewind_core::mode::{Mode, Origin};
use rewind_core::payload::{PayloadCache, PayloadEntry, SharedBuffer};
use rewind_core::scene::NodeMap;
use rewind_core::time::{Duration, HostTime};
use rewind_trace::AnimationStart;
use tracing::{debug, info, warn};

use crate::pending::PendingQueue;

/// What [`CaptureReplayEngine::apply_replayed`] did with a packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Commands applied, including released pending ones.
    pub applied: usize,
    /// Commands held back for a node that does not exist yet.
    pub deferred: usize,
    /// Commands that could not be applied and were discarded.
    pub skipped: usize,
    /// The packet's transaction timestamp shifted into replay time. After a
    /// merge, the latest one.
    pub timestamp: HostTime,
}

impl ApplyReport {
    pub(crate) fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.timestamp = self.timestamp.max(other.timestamp);
    }
}

/// Owns the mode and all identifier and time virtualization.
///
/// [`Mode::None`] is both the initial and the torn-down state; in it every
/// `patch_*` method is the identity. Sessions
/// ([`CaptureSession`](crate::CaptureSession),
/// [`ReplaySession`](crate::ReplaySession)) drive the transitions, but an
/// operator tool may call [`set_mode`](Self::set_mode) directly.
#[derive(Debug)]
pub struct CaptureReplayEngine {
    mode: Mode,
    clock: ReplayClock,
    stats: CommandStats,
    record_start: HostTime,
    /// Animation start offsets from the session start, keyed by the patched
    /// node id so capture and replay address the same entry.
    animation_starts: BTreeMap<(NodeId, u64), Duration>,
    cache: PayloadCache,
    pending: PendingQueue,
}

impl CaptureReplayEngine {
    /// Creates an inert engine.
    #[must_use]
    pub fn new(pending_capacity: usize) -> Self {
        Self {
            mode: Mode::None,
            clock: ReplayClock::new(),
            stats: CommandStats::new(),
            record_start: HostTime::ZERO,
            animation_starts: BTreeMap::new(),
            cache: PayloadCache::new(),
            pending: PendingQueue::new(pending_capacity),
        }
    }

    // -- Mode --

    /// Returns the current mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Switches mode. Entering [`Mode::None`] drops the time correction,
    /// pause state and pending commands.
    pub fn set_mode(&mut self, mode: Mode) {
        if mode == self.mode {
            return;
        }
        info!(from = %self.mode, to = %mode, "mode change");
        self.mode = mode;
        if mode == Mode::None {
            self.clock.clear();
            self.record_start = HostTime::ZERO;
            if !self.pending.is_empty() {
                warn!(dropped = self.pending.len(), "pending commands discarded");
            }
            self.pending.clear();
        }
    }

    // -- Identifier virtualization --

    /// Moves `id` into the replay namespace if the mode requires it for
    /// traffic of this origin.
    #[must_use]
    pub fn patch_node_id(&self, id: NodeId, origin: Origin) -> NodeId {
        if self.mode.patches(origin) { id.patched() } else { id }
    }

    /// Maps `pid` into the mock range if the mode requires it for traffic of
    /// this origin.
    #[must_use]
    pub fn patch_pid(&self, pid: ProcessId, origin: Origin) -> ProcessId {
        if self.mode.patches(origin) { pid.mock() } else { pid }
    }

    // -- Time virtualization --

    /// Applies the pause clamp to a replay-clock timestamp.
    #[must_use]
    pub fn patch_time(&self, time: HostTime) -> HostTime {
        if self.mode.is_reading() {
            self.clock.patch(time)
        } else {
            time
        }
    }

    /// Shifts a recorded transaction timestamp into replay time.
    #[must_use]
    pub fn patch_transaction_time(&self, time: HostTime, origin: Origin) -> HostTime {
        if self.mode.patches(origin) {
            self.clock.patch_transaction(time)
        } else {
            time
        }
    }

    /// Sets the offset between the replay and recorded session starts.
    pub fn set_time_correction(&mut self, replay_start: HostTime, record_start: HostTime) {
        self.clock.set_correction(replay_start, record_start);
        debug!(correction_ns = self.clock.correction(), "time correction set");
    }

    /// Pauses replay time at `until`.
    pub fn pause_at(&mut self, now: HostTime, until: HostTime) {
        self.clock.pause_at(now, until);
        info!(until = until.as_secs_f64(), "replay pause armed");
    }

    /// Resumes replay time.
    pub fn resume(&mut self, now: HostTime) {
        self.clock.resume(now);
        info!(paused_total = self.clock.paused_total().as_secs_f64(), "replay resumed");
    }

    /// Returns the replay clock.
    #[must_use]
    pub fn clock(&self) -> &ReplayClock {
        &self.clock
    }

    pub(crate) fn reset_clock(&mut self) {
        self.clock.clear();
    }

    pub(crate) fn set_record_start(&mut self, start: HostTime) {
        self.record_start = start;
    }

    // -- Command diagnostics --

    /// Counts a command passing through the channel.
    pub fn on_command(&self, command: &Command) {
        self.stats.record_command(command.type_code());
    }

    /// Counts a command being executed.
    pub fn on_execute(&self) {
        self.stats.record_execute();
    }

    /// Closes the current diagnostic packet, overwriting the oldest unread
    /// summary if the ring is full.
    pub fn end_packet(&self, time_secs: f64, packet_size: u32) {
        self.stats.end_packet(time_secs, packet_size);
    }

    /// Returns and resets the command count.
    pub fn take_command_count(&self) -> u32 {
        self.stats.take_command_count()
    }

    /// Returns and resets the execute count.
    pub fn take_execute_count(&self) -> u32 {
        self.stats.take_execute_count()
    }

    /// Pops the oldest finished packet summary.
    pub fn next_packet_summary(&self) -> Option<PacketSummary> {
        self.stats.next_packet()
    }

    /// Returns the diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> &CommandStats {
        &self.stats
    }

    // -- Animation start times --

    /// Remembers when an animation started during capture.
    ///
    /// The entry is keyed by the patched identifier so replay, which only
    /// ever sees patched identifiers, can look it up.
    pub fn observe_animation_start(&mut self, node: NodeId, animation: u64, start: HostTime) {
        if !self.mode.is_writing() {
            return;
        }
        let offset = start.saturating_duration_since(self.record_start);
        self.animation_starts.insert((node.patched(), animation), offset);
    }

    /// Returns when a replayed animation should consider itself started.
    #[must_use]
    pub fn animation_start_time(&self, node: NodeId, animation: u64) -> Option<HostTime> {
        if !self.mode.is_reading() {
            return None;
        }
        let offset = self.animation_starts.get(&(node.patched(), animation))?;
        self.clock
            .replay_start()
            .checked_add(*offset)
            .map(|t| self.clock.patch(t))
    }

    /// Returns the table written into the trace header.
    #[must_use]
    pub fn animation_start_times(&self) -> Vec<AnimationStart> {
        self.animation_starts
            .iter()
            .map(|(&(node, animation), &offset)| AnimationStart {
                node,
                animation,
                offset,
            })
            .collect()
    }

    /// Replaces the table with one read from a trace header.
    pub fn load_animation_start_times(&mut self, starts: &[AnimationStart]) {
        self.animation_starts = starts
            .iter()
            .map(|a| ((a.node.patched(), a.animation), a.offset))
            .collect();
    }

    // -- Payloads --

    /// Copies a shared buffer into the payload cache while capturing.
    ///
    /// Returns `false` if the key was already present, the buffer would push
    /// the cache over its budget, or the engine is not capturing.
    pub fn cache_payload<B: SharedBuffer + ?Sized>(&mut self, key: u64, buffer: &B) -> bool {
        if !self.mode.is_writing() {
            return false;
        }
        if !self.cache.fits(buffer.bytes().len()) {
            warn!(key, len = buffer.bytes().len(), "payload cache full, buffer not mirrored");
            return false;
        }
        self.cache.mirror(key, buffer)
    }

    /// Returns a cached payload.
    #[must_use]
    pub fn payload(&self, key: u64) -> Option<&PayloadEntry> {
        self.cache.get(key)
    }

    /// Returns the payload cache.
    #[must_use]
    pub fn cache(&self) -> &PayloadCache {
        &self.cache
    }

    /// Returns the payload cache for encoding.
    pub fn cache_mut(&mut self) -> &mut PayloadCache {
        &mut self.cache
    }

    /// Replaces the payload cache.
    pub fn set_cache(&mut self, cache: PayloadCache) {
        self.cache = cache;
    }

    /// Moves the payload cache out, leaving an empty one.
    pub fn take_cache(&mut self) -> PayloadCache {
        core::mem::take(&mut self.cache)
    }

    // -- Replay --

    /// Returns the commands waiting for their target node.
    #[must_use]
    pub fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Applies a decoded packet to `map`.
    ///
    /// Identifiers, the packet timestamp and animation timestamps are
    /// patched for replayed traffic. Commands whose node does not exist yet
    /// are deferred and released as soon as a later `CreateNode` makes it.
    pub fn apply_replayed<M: NodeMap + ?Sized>(&mut self, packet: Packet, map: &mut M) -> ApplyReport {
        let mut report = ApplyReport {
            timestamp: self.patch_transaction_time(packet.timestamp, Origin::Replayed),
            ..ApplyReport::default()
        };
        let mode = self.mode;
        let mut work: VecDeque<Command> = packet
            .commands
            .into_iter()
            .map(|mut command| {
                command.patch_ids(|id| if mode.patches(Origin::Replayed) { id.patched() } else { id });
                if let Command::StartAnimation { start, .. } = &mut command {
                    *start = self.patch_transaction_time(*start, Origin::Replayed);
                }
                command
            })
            .collect();

        while let Some(command) = work.pop_front() {
            self.on_execute();
            match command.apply(map) {
                Ok(()) => {
                    report.applied += 1;
                    if let Command::CreateNode { id, .. } = command {
                        map.mark_dirty(id);
                        for ready in self.pending.take(id).into_iter().rev() {
                            work.push_front(ready);
                        }
                    }
                }
                Err(ApplyError::MissingNode(missing)) => {
                    debug!(?missing, code = command.type_code(), "command deferred");
                    self.pending.push(missing, command);
                    report.deferred += 1;
                }
                Err(err @ ApplyError::AlreadyExists(_)) => {
                    debug!(%err, "replayed create skipped");
                    report.skipped += 1;
                }
                Err(err @ ApplyError::LinkRefused { .. }) => {
                    warn!(%err, "replayed link skipped");
                    report.skipped += 1;
                }
            }
        }
        report
    }
}
