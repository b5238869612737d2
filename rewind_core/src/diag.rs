// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lock-free command counters and the recent-packet ring.
//!
//! While capturing, every command is counted and its type code appended to
//! the histogram of the packet being processed. When the packet ends, its
//! summary is published into a 32-slot ring that an external diagnostics
//! consumer drains with [`CommandStats::next_packet`].
//!
//! The ring uses atomic head/tail counters and tolerates exactly one producer
//! and one consumer. It always holds the most recent packets: when the
//! consumer falls behind, the producer overwrites the oldest unread slot and
//! [`CommandStats::overwritten_packets`] counts it. Each slot carries the
//! sequence number of the packet in it, so a read that races an overwrite is
//! detected and retried on the new oldest packet.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering, fence};

use bytemuck::{Pod, Zeroable};

/// Number of packet summaries the ring holds.
pub const PACKET_RING_LEN: usize = 32;

/// Type codes kept per packet; further commands are counted but not listed.
pub const MAX_CODES_PER_PACKET: usize = 1024;

/// Slot stamp while the producer is writing it.
const WRITING: usize = usize::MAX;

/// Fixed-size header preceding the codes in [`PacketSummary::to_bytes`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PacketHeader {
    /// Packet time in seconds.
    pub time_secs: f64,
    /// Packet size in bytes.
    pub packet_size: u32,
    /// Commands in the packet, including unlisted ones.
    pub command_count: u32,
    /// Codes that follow the header.
    pub code_len: u32,
    /// Zero.
    pub reserved: u32,
}

/// One finished packet as seen by the diagnostics consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct PacketSummary {
    /// Packet time in seconds.
    pub time_secs: f64,
    /// Packet size in bytes.
    pub packet_size: u32,
    /// Commands in the packet, including unlisted ones.
    pub command_count: u32,
    /// Type codes of the first [`MAX_CODES_PER_PACKET`] commands.
    pub codes: Vec<u32>,
}

impl PacketSummary {
    /// Returns the native-endian header followed by the codes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = PacketHeader {
            time_secs: self.time_secs,
            packet_size: self.packet_size,
            command_count: self.command_count,
            code_len: u32::try_from(self.codes.len()).unwrap_or(u32::MAX),
            reserved: 0,
        };
        let mut out = bytemuck::bytes_of(&header).to_vec();
        out.extend_from_slice(bytemuck::cast_slice(&self.codes));
        out
    }
}

struct Slot {
    stamp: AtomicUsize,
    time_bits: AtomicU64,
    packet_size: AtomicU32,
    command_count: AtomicU32,
    code_len: AtomicU32,
    codes: Box<[AtomicU32]>,
}

impl Slot {
    fn new() -> Self {
        Self {
            stamp: AtomicUsize::new(WRITING),
            time_bits: AtomicU64::new(0),
            packet_size: AtomicU32::new(0),
            command_count: AtomicU32::new(0),
            code_len: AtomicU32::new(0),
            codes: (0..MAX_CODES_PER_PACKET).map(|_| AtomicU32::new(0)).collect(),
        }
    }
}

/// Process-wide command counters and the recent-packet ring.
pub struct CommandStats {
    command_count: AtomicU32,
    execute_count: AtomicU32,
    overwritten: AtomicU32,

    // -- Open packet (producer only) --
    open_len: AtomicU32,
    open_count: AtomicU32,

    // -- Ring --
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: Box<[Slot]>,
}

impl Default for CommandStats {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandStats")
            .field("command_count", &self.command_count.load(Ordering::Relaxed))
            .field("execute_count", &self.execute_count.load(Ordering::Relaxed))
            .field("overwritten", &self.overwritten.load(Ordering::Relaxed))
            .field("pending", &self.pending_packets())
            .finish_non_exhaustive()
    }
}

impl CommandStats {
    /// Creates empty counters and an empty ring.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command_count: AtomicU32::new(0),
            execute_count: AtomicU32::new(0),
            overwritten: AtomicU32::new(0),
            open_len: AtomicU32::new(0),
            open_count: AtomicU32::new(0),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots: (0..PACKET_RING_LEN).map(|_| Slot::new()).collect(),
        }
    }

    /// Takes the slot for packet `head`, evicting the oldest unread packet
    /// if the ring is full.
    fn claim(&self, head: usize) -> &Slot {
        if head >= PACKET_RING_LEN {
            let oldest = head + 1 - PACKET_RING_LEN;
            let tail = self.tail.fetch_max(oldest, Ordering::AcqRel);
            if tail < oldest {
                self.overwritten.fetch_add(1, Ordering::Relaxed);
            }
        }
        let slot = &self.slots[head % PACKET_RING_LEN];
        slot.stamp.store(WRITING, Ordering::Relaxed);
        fence(Ordering::Release);
        slot
    }

    // -- Producer side --

    /// Counts one command and adds its type code to the open packet.
    pub fn record_command(&self, code: u32) {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        let head = self.head.load(Ordering::Relaxed);
        let slot = if self.open_count.fetch_add(1, Ordering::Relaxed) == 0 {
            self.claim(head)
        } else {
            &self.slots[head % PACKET_RING_LEN]
        };
        let n = self.open_len.load(Ordering::Relaxed) as usize;
        if n < MAX_CODES_PER_PACKET {
            slot.codes[n].store(code, Ordering::Relaxed);
            self.open_len.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts one executed command.
    pub fn record_execute(&self) {
        self.execute_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Closes the open packet and publishes its summary.
    pub fn end_packet(&self, time_secs: f64, packet_size: u32) {
        let code_len = self.open_len.swap(0, Ordering::Relaxed);
        let command_count = self.open_count.swap(0, Ordering::Relaxed);

        let head = self.head.load(Ordering::Relaxed);
        let slot = if command_count == 0 {
            self.claim(head)
        } else {
            &self.slots[head % PACKET_RING_LEN]
        };
        slot.time_bits.store(time_secs.to_bits(), Ordering::Relaxed);
        slot.packet_size.store(packet_size, Ordering::Relaxed);
        slot.command_count.store(command_count, Ordering::Relaxed);
        slot.code_len.store(code_len, Ordering::Relaxed);
        slot.stamp.store(head, Ordering::Release);
        self.head.store(head + 1, Ordering::Release);
    }

    // -- Consumer side --

    /// Pops the oldest unread packet summary.
    pub fn next_packet(&self) -> Option<PacketSummary> {
        loop {
            let tail = self.tail.load(Ordering::Acquire);
            if tail >= self.head.load(Ordering::Acquire) {
                return None;
            }
            let slot = &self.slots[tail % PACKET_RING_LEN];
            if slot.stamp.load(Ordering::Acquire) != tail {
                continue;
            }
            let code_len = (slot.code_len.load(Ordering::Relaxed) as usize).min(MAX_CODES_PER_PACKET);
            let summary = PacketSummary {
                time_secs: f64::from_bits(slot.time_bits.load(Ordering::Relaxed)),
                packet_size: slot.packet_size.load(Ordering::Relaxed),
                command_count: slot.command_count.load(Ordering::Relaxed),
                codes: slot.codes[..code_len]
                    .iter()
                    .map(|c| c.load(Ordering::Relaxed))
                    .collect(),
            };
            fence(Ordering::Acquire);
            if slot.stamp.load(Ordering::Relaxed) != tail {
                continue;
            }
            if self
                .tail
                .compare_exchange(tail, tail + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(summary);
            }
        }
    }

    /// Returns how many summaries are waiting.
    #[must_use]
    pub fn pending_packets(&self) -> usize {
        self.head
            .load(Ordering::Acquire)
            .saturating_sub(self.tail.load(Ordering::Acquire))
    }

    /// Returns and resets the command counter.
    pub fn take_command_count(&self) -> u32 {
        self.command_count.swap(0, Ordering::Relaxed)
    }

    /// Returns and resets the executed-command counter.
    pub fn take_execute_count(&self) -> u32 {
        self.execute_count.swap(0, Ordering::Relaxed)
    }

    /// Returns how many unread summaries were overwritten by newer ones.
    #[must_use]
    pub fn overwritten_packets(&self) -> u32 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
