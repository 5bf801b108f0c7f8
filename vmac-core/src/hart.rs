//! The hart runtime: one virtual hart's step/run/pause loop and the
//! inspector surface around it.
//!
//! A [`Hart`] owns its interpreter core behind a mutex and is driven from
//! one OS thread running [`Hart::run`]; a debugger/inspector thread may
//! concurrently flip the control flags, take snapshots, and manage
//! breakpoints. Snapshots are mutually consistent (never torn across
//! registers) because they clone under the same lock the run loop holds
//! while executing a batch.

use crate::core::{Config, Core, CsrSpecifier, ExecError};
use crate::instruction::Instruction;
use crate::memory::{Memory, RegionMapError};
use crate::registers::FpRegister;
use crate::timer::{MachineTimer, TICKS_PER_SECOND, TIMER_BASE};
use log::{debug, trace};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock};
use std::time::Instant;

/// Number of `(wall-time, ticks)` samples kept for the rolling
/// instructions-per-second estimate.
pub const MAX_HISTORY: usize = 120;

/// Number of instructions executed per lock acquisition in the run loop.
const STEP_BATCH: u32 = 1024;

/// An environment-call handler: receives the hart id, the shared memory
/// fabric, and the caller's full register state.
pub type EcallHandler = Arc<dyn Fn(u32, &Memory, &mut crate::registers::Registers) + Send + Sync>;

static ECALL_HANDLERS: LazyLock<RwLock<HashMap<u32, EcallHandler>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers `handler` for the ECALL id programs place in `a0`.
///
/// The table is process-wide and shared by all harts. It is meant to be
/// populated before any hart starts running; later registrations are
/// possible but only take effect for subsequent ECALLs.
pub fn register_ecall_handler(id: u32, handler: EcallHandler) {
    ECALL_HANDLERS.write().unwrap().insert(id, handler);
}

pub(crate) fn ecall_handler(id: u32) -> Option<EcallHandler> {
    ECALL_HANDLERS.read().unwrap().get(&id).cloned()
}

/// One virtual hart.
pub struct Hart {
    core: Mutex<Core>,
    memory: Arc<Memory>,
    timer: Arc<MachineTimer>,
    running: AtomicBool,
    paused: AtomicBool,
    pause_on_break: AtomicBool,
    breakpoints: Mutex<HashSet<u32>>,
    timing: Mutex<Timing>,
}

#[derive(Debug)]
struct Timing {
    last_update: Instant,
    /// Instructions executed since the last [`Hart::update_time`] call.
    ticks: u64,
    history: VecDeque<Sample>,
}

#[derive(Debug, Copy, Clone)]
struct Sample {
    seconds: f64,
    ticks: u64,
}

impl Hart {
    /// Creates a hart executing from `starting_pc`, attaching the machine
    /// timer region to `memory`.
    ///
    /// The hart starts paused: spawn a thread for [`run`](Self::run) and
    /// clear `paused` to begin execution. Fails if the timer region cannot
    /// be mapped at its conventional base.
    pub fn new(memory: Arc<Memory>, starting_pc: u32, hart_id: u32) -> Result<Self, RegionMapError> {
        let timer = Arc::new(MachineTimer::new());
        memory.attach_region(TIMER_BASE, Arc::clone(&timer) as Arc<dyn crate::memory::MemoryRegion>)?;
        let core = Core::new(
            Arc::clone(&memory),
            Arc::clone(&timer),
            Config {
                hart_id,
                reset_vector: starting_pc,
            },
        );
        debug!("hart {hart_id} created with pc {starting_pc:#010x}");
        Ok(Self {
            core: Mutex::new(core),
            memory,
            timer,
            running: AtomicBool::new(true),
            paused: AtomicBool::new(true),
            pause_on_break: AtomicBool::new(false),
            breakpoints: Mutex::new(HashSet::new()),
            timing: Mutex::new(Timing {
                last_update: Instant::now(),
                ticks: 0,
                history: VecDeque::with_capacity(MAX_HISTORY),
            }),
        })
    }

    /// Executes up to `steps` instructions. Returns `Ok(true)` if the batch
    /// stopped early because the next PC is a breakpoint.
    pub fn step(&self, steps: u32) -> Result<bool, ExecError> {
        let mut core = self.core.lock().unwrap();
        self.timing.lock().unwrap().ticks += u64::from(steps);
        for _ in 0..steps {
            if !self.running.load(Ordering::Relaxed) {
                break;
            }
            core.step()?;
            let pc = core.pc();
            if self.is_breakpoint(pc) {
                trace!("hart {} hit breakpoint at {pc:#010x}", self.id(&core));
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The hart's run loop: executes [`step`](Self::step) batches until
    /// `running` is cleared, yielding the thread while `paused` is set, and
    /// pausing on breakpoint hits when `pause_on_break` is enabled.
    ///
    /// Errors abort the loop and surface to the caller.
    pub fn run(&self) -> Result<(), ExecError> {
        debug!("hart entering run loop");
        while self.running.load(Ordering::Relaxed) {
            if self.paused.load(Ordering::Relaxed) {
                std::thread::yield_now();
                continue;
            }
            if self.step(STEP_BATCH)? && self.pause_on_break.load(Ordering::Relaxed) {
                self.paused.store(true, Ordering::Relaxed);
            }
        }
        debug!("hart leaving run loop");
        Ok(())
    }

    /// Records a wall-clock sample for the IPS estimate and advances the
    /// memory-mapped `mtime`.
    ///
    /// Call this at frame granularity from the host. Fails with
    /// [`ExecError::TimerOverflow`] once `mtime` reaches `mtimecmp`.
    pub fn update_time(&self) -> Result<(), ExecError> {
        let mut timing = self.timing.lock().unwrap();
        let now = Instant::now();
        let seconds = now.duration_since(timing.last_update).as_secs_f64();
        timing.last_update = now;
        let ticks = std::mem::take(&mut timing.ticks);
        timing.history.push_back(Sample { seconds, ticks });
        while timing.history.len() > MAX_HISTORY {
            timing.history.pop_front();
        }
        drop(timing);

        let delta = (seconds * TICKS_PER_SECOND as f64) as u64;
        if self.timer.advance(delta) {
            return Err(ExecError::TimerOverflow {
                mtime: self.timer.mtime(),
                mtimecmp: self.timer.mtimecmp(),
            });
        }
        Ok(())
    }

    /// Rolling instructions-per-second estimate over the recorded history
    /// window.
    pub fn instructions_per_second(&self) -> u64 {
        let timing = self.timing.lock().unwrap();
        let (mut total_seconds, mut total_ticks) = (0.0, 0u64);
        for sample in &timing.history {
            total_seconds += sample.seconds;
            total_ticks += sample.ticks;
        }
        if total_seconds > 0.0 {
            (total_ticks as f64 / total_seconds) as u64
        } else {
            0
        }
    }

    /// Returns `true` if `address` should halt the hart: either the
    /// debugger armed it, or the word there decodes to `ebreak`.
    pub fn is_breakpoint(&self, address: u32) -> bool {
        if self.breakpoints.lock().unwrap().contains(&address) {
            return true;
        }
        match self.memory.peek_word(address) {
            Some(word) => Instruction::decode(word) == Ok(Instruction::Ebreak),
            None => false,
        }
    }

    /// Arms a breakpoint at `address`.
    pub fn add_breakpoint(&self, address: u32) {
        self.breakpoints.lock().unwrap().insert(address);
    }

    /// Disarms the breakpoint at `address`, if any.
    pub fn remove_breakpoint(&self, address: u32) {
        self.breakpoints.lock().unwrap().remove(&address);
    }

    /// Atomically captures all integer registers, all floating-point
    /// registers, and the PC.
    pub fn snapshot(&self) -> ([u32; 32], [FpRegister; 32], u32) {
        let core = self.core.lock().unwrap();
        let registers = core.registers();
        (registers.x_all(), registers.f_all(), registers.pc())
    }

    /// Captures every declared CSR with aliased projections materialised.
    pub fn csr_snapshot(&self) -> HashMap<CsrSpecifier, u32> {
        self.core.lock().unwrap().csr_snapshot()
    }

    pub fn pc(&self) -> u32 {
        self.core.lock().unwrap().pc()
    }

    pub fn is_32_bit(&self) -> bool {
        self.core.lock().unwrap().is_32_bit()
    }

    /// Forces the hart back to its reset state (see [`Core::reset`]).
    pub fn reset(&self) {
        self.core.lock().unwrap().reset();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Clearing this makes [`run`](Self::run) return after the current
    /// instruction batch.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Pausing is cooperative: the run loop finishes its current batch and
    /// then yields until unpaused.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Relaxed);
    }

    pub fn pause_on_break(&self) -> bool {
        self.pause_on_break.load(Ordering::Relaxed)
    }

    pub fn set_pause_on_break(&self, pause: bool) {
        self.pause_on_break.store(pause, Ordering::Relaxed);
    }

    /// Grants scaffolding (tests, loaders) direct access to the core.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        f(&mut self.core.lock().unwrap())
    }

    fn id(&self, core: &Core) -> u32 {
        core.config.hart_id
    }
}

impl std::fmt::Debug for Hart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hart")
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("pause_on_break", &self.pause_on_break())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Ram;

    fn test_hart() -> Hart {
        let memory = Arc::new(Memory::new());
        memory
            .attach_region(0x1000, Arc::new(Ram::new(0x10000).unwrap()))
            .unwrap();
        Hart::new(memory, 0x1000, 0).unwrap()
    }

    fn load_words(hart: &Hart, base: u32, words: &[u32]) {
        for (i, &word) in words.iter().enumerate() {
            hart.with_core(|core| {
                core.memory.write_word(base + 4 * i as u32, word).unwrap();
            });
        }
    }

    #[test]
    fn test_step_counts_and_advances() {
        let hart = test_hart();
        // addi x5, x0, 7; addi x5, x5, -3
        load_words(&hart, 0x1000, &[0x0070_0293, 0xFFD2_8293]);
        assert!(!hart.step(2).unwrap());
        let (x, _, pc) = hart.snapshot();
        assert_eq!(4, x[5]);
        assert_eq!(0x1008, pc);
        assert_eq!(2, hart.with_core(|core| core.cycles()));
    }

    #[test]
    fn test_armed_breakpoint_stops_batch() {
        let hart = test_hart();
        // Four no-op additions.
        load_words(
            &hart,
            0x1000,
            &[0x0000_0013, 0x0000_0013, 0x0000_0013, 0x0000_0013],
        );
        hart.add_breakpoint(0x1008);
        assert!(hart.step(4).unwrap());
        assert_eq!(0x1008, hart.pc());
        hart.remove_breakpoint(0x1008);
        assert!(!hart.step(2).unwrap());
    }

    #[test]
    fn test_ebreak_word_is_breakpoint() {
        let hart = test_hart();
        // addi x0, x0, 0; ebreak
        load_words(&hart, 0x1000, &[0x0000_0013, 0x0010_0073]);
        assert!(hart.is_breakpoint(0x1004));
        // The batch halts before executing the ebreak itself.
        assert!(hart.step(4).unwrap());
        assert_eq!(0x1004, hart.pc());
    }

    #[test]
    fn test_ecall_dispatch() {
        let hart = test_hart();
        register_ecall_handler(
            7001,
            Arc::new(|_, _, registers| {
                let a1 = crate::registers::Specifier::new(11).unwrap();
                registers.set_x(a1, 1234);
            }),
        );
        // lui x10, 0x2; addi x10, x10, -1191  (a0 = 7001); ecall
        load_words(&hart, 0x1000, &[0x0000_2537, 0xB595_0513, 0x0000_0073]);
        hart.step(3).unwrap();
        let (x, _, _) = hart.snapshot();
        assert_eq!(7001, x[10]);
        assert_eq!(1234, x[11]);
    }

    #[test]
    fn test_unknown_ecall_errors() {
        let hart = test_hart();
        // addi x10, x0, 404; ecall
        load_words(&hart, 0x1000, &[0x1940_0513, 0x0000_0073]);
        assert_eq!(
            Err(ExecError::UnknownEcall { hart: 0, id: 404 }),
            hart.step(2)
        );
    }

    #[test]
    fn test_update_time_and_ips() {
        let hart = test_hart();
        load_words(&hart, 0x1000, &[0x0000_0013, 0x0000_0013]);
        hart.step(2).unwrap();
        // Make sure the sampled window is measurably long.
        std::thread::sleep(std::time::Duration::from_millis(5));
        hart.update_time().unwrap();
        assert!(hart.instructions_per_second() > 0);
    }

    #[test]
    fn test_timer_overflow_is_fatal() {
        let hart = test_hart();
        // Arm the comparator below the current mtime.
        hart.timer.set_mtime(100);
        hart.memory
            .write_word(TIMER_BASE, 1)
            .and_then(|()| hart.memory.write_word(TIMER_BASE + 4, 0))
            .unwrap();
        assert!(matches!(
            hart.update_time(),
            Err(ExecError::TimerOverflow { .. })
        ));
    }
}
