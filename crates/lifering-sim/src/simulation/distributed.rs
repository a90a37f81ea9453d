//! Distributed halo-exchange executor.
//!
//! P workers form a ring; worker r's left neighbor is `(r - 1 + P) % P` and
//! its right neighbor is `(r + 1) % P`. Each worker owns a contiguous
//! vertical slab of the global interior, stored as a [`Field`] whose ghost
//! columns mirror the ring neighbors' boundary columns and whose ghost rows
//! mirror the slab's own top/bottom rows (a slab spans the full grid
//! height, so vertical wraparound never crosses a process boundary).
//!
//! Each step exchanges the freshly computed boundary columns with both
//! neighbors, then runs the termination protocol ([`super::stop`]). The
//! worker state machine is `UNINITIALIZED -> STEADY (loop) -> STOPPED`:
//! a priming exchange validates both ghost columns before the first step,
//! and the STOPPED transition releases the border buffers only after the
//! whole group has agreed to stop, so no worker vanishes from the topology
//! while a neighbor still expects its column.
//!
//! On transports without internal send buffering the protocol posts its
//! receives before any send to avoid deadlock; here the endpoint's inbox
//! plays the role of the posted receive (arrivals are stashed and matched
//! in arrival order), and a delivery receipt is the send-complete event,
//! so the step body keeps the same order without extra waits. Any
//! communication failure is fatal to the run: a partially delivered ghost
//! column would corrupt downstream cells without detection, so there is no
//! step-level retry.

use lifering_core::error::{LifeRingError, Result};
use lifering_core::group::{GroupBroker, GroupConfig, GroupEndpoint, Tag};
use tracing::{debug, info};

use super::field::Field;
use super::kernel;
use super::plan::segment_start;
use super::stop::{coordinated_stop, TerminationState};

/// Tag of a boundary column traveling to the sender's left neighbor.
pub const TAG_LEFTWARD: Tag = 1;
/// Tag of a boundary column traveling to the sender's right neighbor.
pub const TAG_RIGHTWARD: Tag = 2;

/// Lifecycle of a distributed worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    /// Created, ghost columns not yet valid.
    Uninitialized,
    /// Primed; stepping until the group stops or the driver runs out of
    /// timesteps.
    Steady,
    /// Terminal. Border buffers released.
    Stopped,
}

/// Per-process state of one ring worker.
///
/// Created once per process lifetime and passed into every step call;
/// destroyed only after the group unanimously decides to stop.
pub struct WorkerContext {
    endpoint: GroupEndpoint,
    left: usize,
    right: usize,
    /// Slab interior height; the length of each border buffer.
    rows: usize,
    left_send: Vec<u8>,
    right_send: Vec<u8>,
    left_recv: Vec<u8>,
    right_recv: Vec<u8>,
    termination: TerminationState,
    state: WorkerState,
}

impl WorkerContext {
    /// Create the worker for `endpoint`'s rank, with border buffers sized
    /// to `slab_rows` (the slab's interior height).
    pub fn new(endpoint: GroupEndpoint, slab_rows: usize) -> Result<Self> {
        if slab_rows == 0 {
            return Err(LifeRingError::InvalidConfig(
                "slab interior height must be positive".to_string(),
            ));
        }
        let size = endpoint.size();
        let rank = endpoint.rank();
        let left = (rank + size - 1) % size;
        let right = (rank + 1) % size;

        debug!(rank, size, left, right, slab_rows, "created worker context");

        Ok(Self {
            endpoint,
            left,
            right,
            rows: slab_rows,
            left_send: allocate_column(slab_rows)?,
            right_send: allocate_column(slab_rows)?,
            left_recv: allocate_column(slab_rows)?,
            right_recv: allocate_column(slab_rows)?,
            termination: TerminationState::new(),
            state: WorkerState::Uninitialized,
        })
    }

    /// This worker's rank.
    pub fn rank(&self) -> usize {
        self.endpoint.rank()
    }

    /// Number of workers in the ring.
    pub fn size(&self) -> usize {
        self.endpoint.size()
    }

    /// True once the group has decided to stop.
    pub fn is_stopped(&self) -> bool {
        self.state == WorkerState::Stopped
    }

    /// Priming exchange: validate both ghost columns of `current` before
    /// the first real step (timestep 0 has no prior step to have filled
    /// them). Transitions `UNINITIALIZED -> STEADY`.
    pub async fn prime(&mut self, current: &mut Field) -> Result<()> {
        if self.state != WorkerState::Uninitialized {
            return Err(LifeRingError::InvariantViolation(format!(
                "rank {}: priming exchange in state {:?}",
                self.rank(),
                self.state
            )));
        }
        self.check_slab(current)?;

        current.wrap_rows();
        self.pack_and_send(current)?;
        self.complete_receives(current).await?;
        self.state = WorkerState::Steady;
        debug!(rank = self.rank(), "worker primed");
        Ok(())
    }

    /// One STEADY step: compute the slab interior, exchange the freshly
    /// computed boundary columns with both ring neighbors, then run the
    /// termination round.
    ///
    /// Returns true when the whole group decided to stop; the border
    /// buffers are released and the worker transitions to STOPPED, so the
    /// caller must exit its step loop. The caller swaps `current` and
    /// `next` after every step, stopped or not.
    pub async fn step(
        &mut self,
        current: &mut Field,
        next: &mut Field,
        timestep: usize,
    ) -> Result<bool> {
        if self.state != WorkerState::Steady {
            return Err(LifeRingError::InvariantViolation(format!(
                "rank {}: step {timestep} in state {:?}",
                self.rank(),
                self.state
            )));
        }
        self.check_slab(current)?;
        self.check_slab(next)?;

        // Local interior update with the scalar kernel, tracking whether
        // any cell changed.
        let width = current.width;
        let mut local_delta = false;
        for y in 1..current.height - 1 {
            let idx0 = y * width + 1;
            let row = &mut next.cells_mut()[idx0..idx0 + width - 2];
            local_delta |= kernel::step_span_scalar(current.cells(), row, width, idx0);
        }

        // The ghost a neighbor needs for step t+1 must reflect step t+1's
        // own boundary, so pack from the freshly computed buffer.
        self.pack_and_send(next)?;

        // Vertical wraparound is intra-slab; no messaging involved.
        next.wrap_rows();

        self.complete_receives(next).await?;

        let stop = coordinated_stop(&mut self.endpoint, &mut self.termination, !local_delta).await?;
        if stop {
            self.release();
            info!(rank = self.rank(), timestep, "group stopped");
        }
        Ok(stop)
    }

    /// Pack `field`'s own boundary columns into the send buffers and post
    /// both sends. The in-process transport copies the payload at post
    /// time, so a delivery receipt doubles as send completion and the
    /// buffers are immediately reusable.
    fn pack_and_send(&mut self, field: &Field) -> Result<()> {
        let width = field.width;
        for k in 0..self.rows {
            self.left_send[k] = field.get(1, k + 1);
            self.right_send[k] = field.get(width - 2, k + 1);
        }
        self.endpoint.send(self.left, TAG_LEFTWARD, &self.left_send)?;
        self.endpoint.send(self.right, TAG_RIGHTWARD, &self.right_send)?;
        Ok(())
    }

    /// Wait for both posted receives, in either completion order, and
    /// write the arriving columns into `field`'s ghost columns.
    async fn complete_receives(&mut self, field: &mut Field) -> Result<()> {
        // The left ghost mirrors the left neighbor's rightward column and
        // vice versa. With P = 2 both neighbors are the same rank and with
        // P = 1 they are this rank itself; the tags keep the two columns
        // apart in both cases.
        let mut wants = vec![(self.left, TAG_RIGHTWARD), (self.right, TAG_LEFTWARD)];
        let mut into_left = vec![true, false];
        while !wants.is_empty() {
            let (want, packet) = self.endpoint.recv_any(&wants).await?;
            if packet.payload.len() != self.rows {
                return Err(LifeRingError::Communication(format!(
                    "rank {}: ghost column from rank {} has {} cells, expected {}",
                    self.rank(),
                    packet.source,
                    packet.payload.len(),
                    self.rows
                )));
            }
            let buffer = if into_left[want] {
                &mut self.left_recv
            } else {
                &mut self.right_recv
            };
            buffer.copy_from_slice(&packet.payload);
            wants.swap_remove(want);
            into_left.swap_remove(want);
        }

        let width = field.width;
        let height = field.height;
        for k in 0..self.rows {
            field.set(0, k + 1, self.left_recv[k]);
            field.set(width - 1, k + 1, self.right_recv[k]);
        }
        // Ghost-row entries of the ghost columns wrap within the received
        // columns, completing the four corners.
        field.set(0, 0, self.left_recv[self.rows - 1]);
        field.set(0, height - 1, self.left_recv[0]);
        field.set(width - 1, 0, self.right_recv[self.rows - 1]);
        field.set(width - 1, height - 1, self.right_recv[0]);
        Ok(())
    }

    fn check_slab(&self, field: &Field) -> Result<()> {
        if field.interior_height() != self.rows {
            return Err(LifeRingError::InvariantViolation(format!(
                "rank {}: slab interior height {} does not match border buffers of {}",
                self.rank(),
                field.interior_height(),
                self.rows
            )));
        }
        Ok(())
    }

    /// Release the four border buffers and enter the terminal state.
    fn release(&mut self) {
        self.left_send = Vec::new();
        self.right_send = Vec::new();
        self.left_recv = Vec::new();
        self.right_recv = Vec::new();
        self.state = WorkerState::Stopped;
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .field("rows", &self.rows)
            .field("state", &self.state)
            .finish()
    }
}

/// The interior column ranges `[start, end)` of `ranks` vertical slabs
/// over a global interior width, using the same rounded boundaries as the
/// tile planner.
///
/// Fails fast if rounding produces a zero-width slab or the slabs do not
/// partition the interior exactly.
pub fn slab_ranges(interior_width: usize, ranks: usize) -> Result<Vec<(usize, usize)>> {
    if ranks == 0 {
        return Err(LifeRingError::InvalidConfig(
            "worker count must be positive".to_string(),
        ));
    }
    let factor = interior_width as f64 / ranks as f64;
    let mut ranges = Vec::with_capacity(ranks);
    for rank in 0..ranks {
        let start = segment_start(rank, factor);
        let end = segment_start(rank + 1, factor);
        if start >= end {
            return Err(LifeRingError::InvariantViolation(format!(
                "slab {rank} of {ranks} over width {interior_width} is degenerate ({start}..{end})"
            )));
        }
        ranges.push((start, end));
    }
    // Adjacent starts/ends match by construction; the extremes must too.
    let (_, last_end) = ranges[ranks - 1];
    if ranges[0].0 != 0 || last_end != interior_width {
        return Err(LifeRingError::InvariantViolation(format!(
            "slabs cover {}..{last_end} of interior width {interior_width}",
            ranges[0].0
        )));
    }
    Ok(ranges)
}

/// Split a global field into per-rank slab fields.
///
/// Each slab copies its interior columns from the global interior; its
/// ghost border stays dead until the priming exchange and the first
/// vertical wrap fill it.
pub fn scatter_slabs(global: &Field, ranks: usize) -> Result<Vec<Field>> {
    let ranges = slab_ranges(global.interior_width(), ranks)?;
    let height = global.interior_height();

    let mut slabs = Vec::with_capacity(ranks);
    for &(start, end) in &ranges {
        let mut slab = Field::new(end - start, height, 1, 1)?;
        for y in 0..height {
            for x in 0..end - start {
                slab.set(x + 1, y + 1, global.get(start + x + 1, y + 1));
            }
        }
        slabs.push(slab);
    }
    Ok(slabs)
}

/// Reassemble the global interior (row-major, no ghosts) from per-rank
/// slabs in rank order.
pub fn gather_interior(slabs: &[Field]) -> Result<Vec<u8>> {
    let height = match slabs.first() {
        Some(slab) => slab.interior_height(),
        None => return Ok(Vec::new()),
    };
    if slabs.iter().any(|s| s.interior_height() != height) {
        return Err(LifeRingError::InvariantViolation(
            "slabs disagree on interior height".to_string(),
        ));
    }

    let width: usize = slabs.iter().map(|s| s.interior_width()).sum();
    let mut interior = Vec::with_capacity(width * height);
    for y in 1..=height {
        for slab in slabs {
            let row = y * slab.width;
            interior.extend_from_slice(&slab.cells()[row + 1..row + slab.width - 1]);
        }
    }
    Ok(interior)
}

/// Run a distributed simulation of `global` over `ranks` ring workers for
/// at most `timesteps` steps, stopping early when the group stabilizes.
///
/// Returns the final global interior (row-major, no ghosts) and the number
/// of steps actually taken. Each worker runs as its own task over one
/// in-process broker; a worker failure fails the whole run.
pub async fn run_distributed(
    global: &Field,
    ranks: usize,
    timesteps: usize,
) -> Result<(Vec<u8>, usize)> {
    let slabs = scatter_slabs(global, ranks)?;
    let broker = GroupBroker::new(ranks, GroupConfig::default());
    info!(ranks, timesteps, "starting distributed run");

    let mut tasks = Vec::with_capacity(ranks);
    for (rank, mut current) in slabs.into_iter().enumerate() {
        let endpoint = broker.endpoint(rank)?;
        tasks.push(tokio::spawn(async move {
            let mut context = WorkerContext::new(endpoint, current.interior_height())?;
            let mut next = Field::like(&current)?;
            context.prime(&mut current).await?;

            let mut steps = 0;
            for timestep in 0..timesteps {
                let stopped = context.step(&mut current, &mut next, timestep).await?;
                std::mem::swap(&mut current, &mut next);
                steps = timestep + 1;
                if stopped {
                    break;
                }
            }
            Ok::<(Field, usize), LifeRingError>((current, steps))
        }));
    }

    let mut slabs = Vec::with_capacity(ranks);
    let mut steps_taken = None;
    for (rank, task) in tasks.into_iter().enumerate() {
        let (slab, steps) = task
            .await
            .map_err(|e| LifeRingError::Communication(format!("worker {rank} died: {e}")))??;
        // Stop decisions are unanimous per step, so every rank must report
        // the same count.
        match steps_taken {
            None => steps_taken = Some(steps),
            Some(expected) if expected == steps => {}
            Some(expected) => {
                return Err(LifeRingError::InvariantViolation(format!(
                    "rank {rank} took {steps} steps, rank 0 took {expected}"
                )));
            }
        }
        slabs.push(slab);
    }

    let interior = gather_interior(&slabs)?;
    Ok((interior, steps_taken.unwrap_or(0)))
}

fn allocate_column(len: usize) -> Result<Vec<u8>> {
    let mut column = Vec::new();
    column.try_reserve_exact(len).map_err(|e| {
        LifeRingError::ResourceExhausted(format!("border buffer of {len} bytes: {e}"))
    })?;
    column.resize(len, 0);
    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_ranges_partition_the_width() {
        for width in [8usize, 17, 32, 100] {
            for ranks in 1..=8 {
                if width < ranks {
                    continue;
                }
                let ranges = slab_ranges(width, ranks).unwrap();
                assert_eq!(ranges[0].0, 0);
                assert_eq!(ranges[ranks - 1].1, width);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].1, pair[1].0, "width={width} ranks={ranks}");
                }
            }
        }
    }

    #[test]
    fn too_many_ranks_is_an_invariant_violation() {
        let err = slab_ranges(3, 7).unwrap_err();
        assert!(matches!(err, LifeRingError::InvariantViolation(_)));
    }

    #[test]
    fn scatter_then_gather_is_identity() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let mut rng = StdRng::seed_from_u64(5);
        let mut global = Field::new(20, 9, 1, 1).unwrap();
        global.fill_random(&mut rng);

        for ranks in [1usize, 2, 4, 5] {
            let slabs = scatter_slabs(&global, ranks).unwrap();
            assert_eq!(slabs.len(), ranks);
            assert_eq!(gather_interior(&slabs).unwrap(), global.interior_cells());
        }
    }

    #[tokio::test]
    async fn stepping_before_priming_is_rejected() {
        let broker = GroupBroker::new(1, GroupConfig::default());
        let endpoint = broker.endpoint(0).unwrap();
        let mut context = WorkerContext::new(endpoint, 4).unwrap();
        let mut current = Field::new(4, 4, 1, 1).unwrap();
        let mut next = Field::like(&current).unwrap();

        let err = context.step(&mut current, &mut next, 0).await.unwrap_err();
        assert!(matches!(err, LifeRingError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn priming_twice_is_rejected() {
        let broker = GroupBroker::new(1, GroupConfig::default());
        let endpoint = broker.endpoint(0).unwrap();
        let mut context = WorkerContext::new(endpoint, 4).unwrap();
        let mut current = Field::new(4, 4, 1, 1).unwrap();

        context.prime(&mut current).await.unwrap();
        let err = context.prime(&mut current).await.unwrap_err();
        assert!(matches!(err, LifeRingError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn single_rank_priming_mirrors_the_torus() {
        let broker = GroupBroker::new(1, GroupConfig::default());
        let endpoint = broker.endpoint(0).unwrap();
        let mut context = WorkerContext::new(endpoint, 3).unwrap();

        let mut current = Field::new(4, 3, 1, 1).unwrap();
        for y in 1..=3 {
            for x in 1..=4 {
                current.set(x, y, ((x + y) % 2) as u8);
            }
        }
        context.prime(&mut current).await.unwrap();

        let mut wrapped = current.clone();
        wrapped.wrap_borders();
        assert_eq!(current.cells(), wrapped.cells());
    }
}
