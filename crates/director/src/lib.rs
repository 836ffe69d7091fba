//! Mode controller for the dual preview/export render loop.
//!
//! The [`Director`] owns the "a tick is currently scheduled" state and decides
//! which of the two loops is active:
//!
//! ```text
//!   Idle ──start()──▶ Previewing ◀──────────────┐
//!                        │  ▲                   │
//!         interrupt() +  │  │ resume_preview()  │ last export tick
//!         begin_export() │  │ (reset)           │ (host finalizes capture)
//!                        ▼  │                   │
//!                      Exporting ───────────────┘
//! ```
//!
//! Scheduling goes through the injected [`FrameScheduler`], so the whole state
//! machine runs deterministically in tests without a real display loop. The
//! preview clock comes from an injected [`TimeSource`]; the export clock is a
//! frame-counter accumulator that advances by `1 / frame_rate` per tick.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Opaque identifier for one scheduled tick.
///
/// Handles are minted by the [`FrameScheduler`] and compared by the director
/// when a tick fires, so a callback delivered after its handle was canceled is
/// dropped instead of driving a stale loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickHandle(u64);

impl TickHandle {
    pub fn new(raw: u64) -> Self {
        TickHandle(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Host primitive that queues a callback for the next display refresh.
pub trait FrameScheduler {
    /// Requests one tick and returns the handle identifying it.
    fn schedule_next(&mut self) -> TickHandle;

    /// Revokes a previously scheduled tick before it fires.
    fn cancel(&mut self, handle: TickHandle);
}

/// Abstraction over where the preview elapsed time originates from.
pub trait TimeSource {
    /// Moves the zero reference to "now".
    fn reset(&mut self);

    /// Seconds elapsed since the last reset.
    fn elapsed(&mut self) -> f32;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn reset(&mut self) {
        self.origin = Instant::now();
    }

    fn elapsed(&mut self) -> f32 {
        self.origin.elapsed().as_secs_f32()
    }
}

/// Time source driven explicitly by the caller.
///
/// Clones share the same underlying value, so a test can keep a handle while
/// the director owns the source.
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    seconds: Rc<Cell<f32>>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, seconds: f32) {
        self.seconds.set(self.seconds.get() + seconds);
    }

    pub fn set(&self, seconds: f32) {
        self.seconds.set(seconds);
    }
}

impl TimeSource for ManualTimeSource {
    fn reset(&mut self) {
        self.seconds.set(0.0);
    }

    fn elapsed(&mut self) -> f32 {
        self.seconds.get()
    }
}

/// Export configuration, read once at export start and immutable for the run.
///
/// A zero frame rate is a caller contract violation, not something the
/// director validates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportPlan {
    /// Frames per second of the exported sequence.
    pub frame_rate: u32,
    /// Shader time at which the first exported frame is evaluated (seconds).
    pub start_time: f32,
    /// Length of the exported sequence (seconds).
    pub duration: f32,
}

impl ExportPlan {
    /// Shader time for the given exported frame.
    pub fn frame_time(&self, frame_index: u32) -> f32 {
        self.start_time + frame_index as f32 / self.frame_rate as f32
    }

    /// Total frames the run will capture: `ceil(duration * frame_rate)`.
    pub fn total_frames(&self) -> u32 {
        let mut frames = (self.duration * self.frame_rate as f32).ceil().max(0.0) as u32;
        // The product can round up past the frame the accumulator comparison
        // actually stops at; walk back to the loop's own fixed point.
        while frames > 0 && self.accumulated(frames - 1) >= self.duration {
            frames -= 1;
        }
        frames
    }

    /// Accumulated export time after `frames_captured` frames.
    ///
    /// Derived by division rather than by summing `1 / frame_rate`, so the
    /// `accumulator >= duration` comparison lands on exactly the frame the
    /// frame count formula predicts.
    fn accumulated(&self, frames_captured: u32) -> f32 {
        frames_captured as f32 / self.frame_rate as f32
    }
}

/// Which loop, if any, is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Previewing,
    Exporting,
}

/// What the host must do for the tick that just fired.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Render one preview frame at the given shader time.
    Preview { time: f32 },
    /// Render one export frame and hand the raster to the capture
    /// collaborator. When `last` is set the director has already moved back
    /// to `Previewing` without scheduling; the host finalizes the capture
    /// (stop + save), rebuilds the program, and calls
    /// [`Director::resume_preview`].
    Export {
        time: f32,
        frame_index: u32,
        last: bool,
    },
}

struct ExportRun {
    plan: ExportPlan,
    frames_captured: u32,
}

/// The mode controller.
///
/// Invariant: at most one tick is scheduled at any time. Every internal
/// schedule goes through [`Director::reschedule`], which cancels any pending
/// handle first (cancel-then-start, never the reverse).
pub struct Director<S: FrameScheduler, T: TimeSource> {
    scheduler: S,
    time: T,
    mode: Mode,
    pending: Option<TickHandle>,
    export: Option<ExportRun>,
}

impl<S: FrameScheduler, T: TimeSource> Director<S, T> {
    pub fn new(scheduler: S, time: T) -> Self {
        Self {
            scheduler,
            time,
            mode: Mode::Idle,
            pending: None,
            export: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    /// Startup transition: `Idle` to `Previewing` with the clock at zero.
    pub fn start(&mut self) {
        tracing::debug!("entering continuous preview");
        self.time.reset();
        self.mode = Mode::Previewing;
        self.reschedule();
    }

    /// Cancels the outstanding tick ahead of a recompiling transition.
    ///
    /// Returns whether a tick was actually canceled. If the recompile that
    /// follows fails, the system stays in its prior mode with the tick
    /// already gone; that asymmetry is part of the contract.
    pub fn interrupt(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) => {
                self.scheduler.cancel(handle);
                true
            }
            None => false,
        }
    }

    /// Completes the apply/reset transition: elapsed time back to zero,
    /// continuous ticking resumed.
    pub fn resume_preview(&mut self) {
        tracing::debug!("resuming preview with a fresh clock");
        self.export = None;
        self.time.reset();
        self.mode = Mode::Previewing;
        self.reschedule();
    }

    /// Begins the bounded export tick sequence with the accumulator at zero.
    ///
    /// Callers interrupt and rebuild the program first; re-triggering while a
    /// run is underway abandons the old run and starts over.
    pub fn begin_export(&mut self, plan: ExportPlan) {
        tracing::debug!(
            frame_rate = plan.frame_rate,
            start_time = plan.start_time,
            duration = plan.duration,
            frames = plan.total_frames(),
            "entering export loop"
        );
        self.export = Some(ExportRun {
            plan,
            frames_captured: 0,
        });
        self.mode = Mode::Exporting;
        self.reschedule();
    }

    /// Reports a scheduled tick firing.
    ///
    /// Returns `None` for handles that no longer match the pending one; that
    /// is how a canceled tick is guaranteed to never drive the loop even when
    /// the host's scheduling primitive cannot revoke callbacks.
    pub fn fire(&mut self, handle: TickHandle) -> Option<Tick> {
        if self.pending != Some(handle) {
            tracing::trace!(handle = handle.raw(), "ignoring stale tick");
            return None;
        }
        self.pending = None;

        match self.mode {
            Mode::Idle => None,
            Mode::Previewing => {
                self.reschedule();
                Some(Tick::Preview {
                    time: self.time.elapsed(),
                })
            }
            Mode::Exporting => {
                let run = self.export.as_mut().expect("exporting without a plan");
                let frame_index = run.frames_captured;
                let time = run.plan.frame_time(frame_index);
                run.frames_captured += 1;
                let last = run.plan.accumulated(run.frames_captured) >= run.plan.duration;
                if last {
                    // The host finalizes the capture, rebuilds the program,
                    // and calls resume_preview() to restart the clock.
                    self.export = None;
                    self.mode = Mode::Previewing;
                } else {
                    self.reschedule();
                }
                Some(Tick::Export {
                    time,
                    frame_index,
                    last,
                })
            }
        }
    }

    fn reschedule(&mut self) {
        if let Some(stale) = self.pending.take() {
            self.scheduler.cancel(stale);
        }
        self.pending = Some(self.scheduler.schedule_next());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Schedule(u64),
        Cancel(u64),
    }

    #[derive(Default)]
    struct FakeScheduler {
        next: u64,
        ops: Vec<Op>,
    }

    impl FrameScheduler for FakeScheduler {
        fn schedule_next(&mut self) -> TickHandle {
            let handle = TickHandle::new(self.next);
            self.next += 1;
            self.ops.push(Op::Schedule(handle.raw()));
            handle
        }

        fn cancel(&mut self, handle: TickHandle) {
            self.ops.push(Op::Cancel(handle.raw()));
        }
    }

    fn director() -> (Director<FakeScheduler, ManualTimeSource>, ManualTimeSource) {
        let time = ManualTimeSource::new();
        (
            Director::new(FakeScheduler::default(), time.clone()),
            time,
        )
    }

    fn fire_pending(director: &mut Director<FakeScheduler, ManualTimeSource>) -> Option<Tick> {
        let handle = director.pending.expect("a tick should be scheduled");
        director.fire(handle)
    }

    #[test]
    fn preview_reschedules_every_tick() {
        let (mut director, _) = director();
        director.start();
        for _ in 0..5 {
            assert!(director.is_scheduled());
            assert!(matches!(
                fire_pending(&mut director),
                Some(Tick::Preview { .. })
            ));
        }
        assert!(director.is_scheduled());
        assert_eq!(director.mode(), Mode::Previewing);
    }

    #[test]
    fn preview_time_comes_from_the_source() {
        let (mut director, time) = director();
        director.start();
        time.set(0.25);
        match fire_pending(&mut director) {
            Some(Tick::Preview { time }) => assert!((time - 0.25).abs() < 1e-6),
            other => panic!("unexpected tick {other:?}"),
        }
    }

    #[test]
    fn export_frame_count_is_duration_times_rate() {
        let (mut director, _) = director();
        director.start();
        director.interrupt();
        director.begin_export(ExportPlan {
            frame_rate: 30,
            start_time: 0.0,
            duration: 2.0,
        });

        let mut frames = 0;
        loop {
            match fire_pending(&mut director) {
                Some(Tick::Export {
                    time,
                    frame_index,
                    last,
                }) => {
                    assert!((time - frame_index as f32 / 30.0).abs() < 1e-5);
                    frames += 1;
                    if last {
                        break;
                    }
                }
                other => panic!("unexpected tick {other:?}"),
            }
        }
        assert_eq!(frames, 60);
        assert_eq!(director.mode(), Mode::Previewing);
    }

    #[test]
    fn fractional_durations_round_up() {
        let (mut director, _) = director();
        director.start();
        director.interrupt();
        let plan = ExportPlan {
            frame_rate: 30,
            start_time: 0.0,
            duration: 0.05,
        };
        assert_eq!(plan.total_frames(), 2);
        director.begin_export(plan);

        let mut frames = 0;
        loop {
            match fire_pending(&mut director) {
                Some(Tick::Export { last, .. }) => {
                    frames += 1;
                    if last {
                        break;
                    }
                }
                other => panic!("unexpected tick {other:?}"),
            }
        }
        assert_eq!(frames, 2);
    }

    #[test]
    fn export_times_honor_the_start_offset() {
        let (mut director, _) = director();
        director.start();
        director.interrupt();
        director.begin_export(ExportPlan {
            frame_rate: 10,
            start_time: 1.5,
            duration: 0.3,
        });

        let mut times = Vec::new();
        loop {
            match fire_pending(&mut director) {
                Some(Tick::Export { time, last, .. }) => {
                    times.push(time);
                    if last {
                        break;
                    }
                }
                other => panic!("unexpected tick {other:?}"),
            }
        }
        let expected = [1.5, 1.6, 1.7];
        assert_eq!(times.len(), expected.len());
        for (actual, want) in times.iter().zip(expected) {
            assert!((actual - want).abs() < 1e-5, "{actual} != {want}");
        }
    }

    #[test]
    fn exactly_one_cancel_between_preview_and_export() {
        let (mut director, _) = director();
        director.start();
        assert!(director.interrupt());
        director.begin_export(ExportPlan {
            frame_rate: 24,
            start_time: 0.0,
            duration: 1.0,
        });
        assert_eq!(
            director.scheduler().ops,
            vec![Op::Schedule(0), Op::Cancel(0), Op::Schedule(1)]
        );
    }

    #[test]
    fn last_tick_leaves_preview_unscheduled_until_resumed() {
        let (mut director, time) = director();
        director.start();
        director.interrupt();
        director.begin_export(ExportPlan {
            frame_rate: 1,
            start_time: 0.0,
            duration: 1.0,
        });

        match fire_pending(&mut director) {
            Some(Tick::Export { last: true, .. }) => {}
            other => panic!("unexpected tick {other:?}"),
        }
        assert_eq!(director.mode(), Mode::Previewing);
        assert!(!director.is_scheduled());

        time.set(4.0);
        director.resume_preview();
        assert!(director.is_scheduled());
        match fire_pending(&mut director) {
            Some(Tick::Preview { time }) => assert_eq!(time, 0.0),
            other => panic!("unexpected tick {other:?}"),
        }
    }

    #[test]
    fn canceled_ticks_never_fire() {
        let (mut director, _) = director();
        director.start();
        let stale = director.pending.expect("scheduled");
        director.interrupt();
        assert_eq!(director.fire(stale), None);

        director.resume_preview();
        assert_eq!(director.fire(stale), None, "old handle must stay dead");
        assert!(matches!(
            fire_pending(&mut director),
            Some(Tick::Preview { .. })
        ));
    }

    #[test]
    fn interrupt_without_a_pending_tick_is_a_no_op() {
        let (mut director, _) = director();
        assert!(!director.interrupt());
        director.start();
        assert!(director.interrupt());
        assert!(!director.interrupt());
    }

    #[test]
    fn retriggered_export_restarts_the_accumulator() {
        let (mut director, _) = director();
        director.start();
        director.interrupt();
        let plan = ExportPlan {
            frame_rate: 10,
            start_time: 0.0,
            duration: 1.0,
        };
        director.begin_export(plan);
        for _ in 0..3 {
            fire_pending(&mut director);
        }

        director.interrupt();
        director.begin_export(plan);
        match fire_pending(&mut director) {
            Some(Tick::Export {
                frame_index, time, ..
            }) => {
                assert_eq!(frame_index, 0);
                assert_eq!(time, 0.0);
            }
            other => panic!("unexpected tick {other:?}"),
        }
    }

    #[test]
    fn plan_reports_total_frames() {
        let plan = ExportPlan {
            frame_rate: 30,
            start_time: 0.0,
            duration: 2.0,
        };
        assert_eq!(plan.total_frames(), 60);
        let plan = ExportPlan {
            frame_rate: 24,
            start_time: 0.0,
            duration: 0.5,
        };
        assert_eq!(plan.total_frames(), 12);
        // 0.3 * 10 lands just above 3.0 in f32; the count must still match
        // the accumulator comparison the export loop uses.
        let plan = ExportPlan {
            frame_rate: 10,
            start_time: 0.0,
            duration: 0.3,
        };
        assert_eq!(plan.total_frames(), 3);
    }
}
