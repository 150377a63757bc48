//! aya-backed record sources
//!
//! - [`RingBufSource`]: one `BPF_MAP_TYPE_RINGBUF`, drained in order
//! - [`PerfSource`]: one perf buffer per online CPU of a
//!   `BPF_MAP_TYPE_PERF_EVENT_ARRAY`, read in batches
//!
//! Both block in `poll(2)` for at most the requested timeout.

#![allow(unsafe_code)] // poll(2) requires unsafe

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;

use anyhow::{Context, Result};
use aya::maps::{
    perf::{PerfEventArray, PerfEventArrayBuffer},
    MapData, RingBuf,
};
use bytes::BytesMut;
use log::debug;

use super::backend::{Polled, RecordSource};
use super::cpu_utils::online_cpus;
use crate::domain::CpuId;

/// Records read from one perf buffer in a single batch
const PERF_BATCH: usize = 16;
const PERF_RECORD_CAPACITY: usize = 1024;

/// Wait until at least one descriptor is readable or `timeout` passes.
/// Returns the indices of readable descriptors.
fn wait_readable(fds: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<Vec<usize>> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|fd| libc::pollfd { fd: fd.as_raw_fd(), events: libc::POLLIN, revents: 0 })
        .collect();
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    let count = libc::nfds_t::try_from(pollfds.len()).unwrap_or(libc::nfds_t::MAX);

    // SAFETY: `pollfds` is a live, exclusively borrowed array of `count` pollfd entries
    let ret = unsafe { libc::poll(pollfds.as_mut_ptr(), count, timeout_ms) };
    if ret < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Vec::new());
        }
        return Err(err);
    }

    Ok(pollfds
        .iter()
        .enumerate()
        .filter(|(_, p)| p.revents & libc::POLLIN != 0)
        .map(|(i, _)| i)
        .collect())
}

/// Ring buffer subscription
pub struct RingBufSource {
    ring: RingBuf<MapData>,
    scratch: Vec<u8>,
}

impl RingBufSource {
    #[must_use]
    pub fn new(ring: RingBuf<MapData>) -> Self {
        Self { ring, scratch: Vec::new() }
    }

    /// Copy the next record into `scratch`, releasing it back to the kernel
    fn take_next(&mut self) -> bool {
        match self.ring.next() {
            Some(item) => {
                self.scratch.clear();
                self.scratch.extend_from_slice(&item);
                true
            }
            None => false,
        }
    }
}

impl RecordSource for RingBufSource {
    fn poll(&mut self, timeout: Duration) -> Result<Polled<'_>> {
        if !self.take_next() {
            // SAFETY: the descriptor belongs to `self.ring`, which outlives this call
            let fd = unsafe { BorrowedFd::borrow_raw(self.ring.as_raw_fd()) };
            wait_readable(&[fd], timeout).context("poll on ring buffer failed")?;
            if !self.take_next() {
                return Ok(Polled::Empty);
            }
        }
        Ok(Polled::Record(&self.scratch))
    }
}

/// Perf event array subscription across all online CPUs
pub struct PerfSource {
    buffers: Vec<(CpuId, PerfEventArrayBuffer<MapData>)>,
    batch: Vec<BytesMut>,
    batch_len: usize,
    cursor: usize,
    lost: u64,
    /// Buffer to look at first on the next read, so busy CPUs don't starve the rest
    next_buffer: usize,
    _array: PerfEventArray<MapData>,
}

impl PerfSource {
    /// Open one perf buffer of `page_count` pages per online CPU
    ///
    /// # Errors
    /// Returns an error if online CPUs cannot be listed or a buffer cannot be opened
    pub fn open(mut array: PerfEventArray<MapData>, page_count: usize) -> Result<Self> {
        let cpus = online_cpus()?;
        let mut buffers = Vec::with_capacity(cpus.len());
        for cpu in cpus {
            let buffer = array
                .open(cpu.0, Some(page_count))
                .with_context(|| format!("Failed to open perf buffer on {cpu}"))?;
            buffers.push((cpu, buffer));
        }
        debug!("Opened {} perf buffers with {page_count} pages each", buffers.len());

        Ok(Self {
            buffers,
            batch: (0..PERF_BATCH).map(|_| BytesMut::with_capacity(PERF_RECORD_CAPACITY)).collect(),
            batch_len: 0,
            cursor: 0,
            lost: 0,
            next_buffer: 0,
            _array: array,
        })
    }

    /// Read one batch from the first readable buffer, starting at `next_buffer`
    fn refill(&mut self, ready: &[usize]) -> Result<()> {
        let total = self.buffers.len();
        for step in 0..total {
            let index = (self.next_buffer + step) % total;
            if !ready.contains(&index) {
                continue;
            }
            let (cpu, buffer) = &mut self.buffers[index];
            if !buffer.readable() {
                continue;
            }
            let events = buffer
                .read_events(&mut self.batch)
                .with_context(|| format!("Failed to read perf buffer on {cpu}"))?;
            self.batch_len = events.read;
            self.cursor = 0;
            self.lost += events.lost as u64;
            self.next_buffer = (index + 1) % total;
            return Ok(());
        }
        Ok(())
    }
}

impl RecordSource for PerfSource {
    fn poll(&mut self, timeout: Duration) -> Result<Polled<'_>> {
        if self.cursor >= self.batch_len && self.lost == 0 {
            let ready = {
                let fds: Vec<BorrowedFd<'_>> = self.buffers.iter().map(|(_, b)| b.as_fd()).collect();
                wait_readable(&fds, timeout).context("poll on perf buffers failed")?
            };
            self.refill(&ready)?;
        }

        if self.lost > 0 {
            let lost = std::mem::take(&mut self.lost);
            return Ok(Polled::Lost(lost));
        }
        if self.cursor < self.batch_len {
            let index = self.cursor;
            self.cursor += 1;
            return Ok(Polled::Record(&self.batch[index][..]));
        }
        Ok(Polled::Empty)
    }
}
