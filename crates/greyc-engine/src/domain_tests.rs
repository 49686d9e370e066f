//! Domain-critical regression tests for greyc-engine.
//!
//! These tests are designed to catch specific classes of bugs, not just
//! confirm happy paths. Each test documents the regression it guards against.

#[cfg(test)]
mod domain_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::image::noise;
    use crate::kernel::{KernelContext, KernelError, TileStatus};
    use crate::{
        plan, DiffusionParams, EngineError, ImageBuffer, InpaintMask, NoProgress, Parameters,
        PatchParams, Regularizer, RunConfig, RunController, RunPhase, RunResult, StopHandle,
        TileBuffer, TileKernel,
    };

    /// Adds one to every sample of the tile and records which tiles ran.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, usize)>>,
    }

    impl TileKernel for Recorder {
        fn apply(
            &self,
            tile: &mut TileBuffer,
            ctx: &KernelContext<'_>,
        ) -> Result<TileStatus, KernelError> {
            self.seen
                .lock()
                .unwrap()
                .push((ctx.iteration(), tile.tile().index));
            for v in tile.pixels_mut().as_mut_slice() {
                *v = v.wrapping_add(1);
            }
            ctx.report(100.0);
            Ok(TileStatus::Done)
        }
    }

    /// Sleeps in small steps, honouring the halt flag between steps.
    struct Slow {
        steps: usize,
        step: Duration,
    }

    impl TileKernel for Slow {
        fn apply(
            &self,
            _tile: &mut TileBuffer,
            ctx: &KernelContext<'_>,
        ) -> Result<TileStatus, KernelError> {
            for i in 0..self.steps {
                if ctx.should_stop() {
                    return Ok(TileStatus::Cancelled);
                }
                thread::sleep(self.step);
                ctx.report(100.0 * (i + 1) as f32 / self.steps as f32);
            }
            Ok(TileStatus::Done)
        }
    }

    fn noisy(width: usize, height: usize, channels: usize, seed: u64) -> ImageBuffer {
        let mut image = ImageBuffer::new(width, height, channels).unwrap();
        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    let v = if (x / 8 + y / 8) % 2 == 0 { 60 } else { 190 };
                    image.set(x, y, c, v + (c * 5) as u8);
                }
            }
        }
        noise::add_gaussian_noise(&mut image, 12.0, &mut StdRng::seed_from_u64(seed)).unwrap();
        image
    }

    // ========================================================================
    // GAP 1: Tiling geometry -- cores partition the image, borders stay inside
    // ========================================================================

    /// If this breaks, it means: some pixels are never written back (gaps) or
    /// written by two tiles in the same pass (overlaps), which shows up as
    /// seams or as a data race between workers.
    #[test]
    fn test_cores_partition_image_exactly() {
        for &(w, h) in &[(1, 1), (7, 3), (64, 64), (100, 37), (257, 511)] {
            for &tile_size in &[1, 5, 16, 64, 256] {
                for &border in &[0, 3, 16] {
                    let plan = plan(w, h, tile_size, border).unwrap();
                    let mut hits = vec![0u8; w * h];
                    for tile in plan.iter() {
                        for y in tile.core.y..tile.core.bottom() {
                            for x in tile.core.x..tile.core.right() {
                                hits[y * w + x] += 1;
                            }
                        }
                    }
                    assert!(
                        hits.iter().all(|&n| n == 1),
                        "{w}x{h} tile {tile_size} border {border}: gap or overlap"
                    );
                }
            }
        }
    }

    /// If this breaks, it means: a tile's bordered rectangle reaches outside
    /// the image and extraction would read out of bounds.
    #[test]
    fn test_bordered_rect_clamped_to_image() {
        for &(w, h) in &[(10, 10), (300, 200), (33, 1)] {
            for &tile_size in &[4, 16, 256] {
                let plan = plan(w, h, tile_size, 16).unwrap();
                for tile in plan.iter() {
                    assert!(tile.bordered.right() <= w && tile.bordered.bottom() <= h);
                    assert!(tile.bordered.contains_rect(&tile.core));
                }
            }
        }
    }

    /// If this breaks, it means: disabling tiling no longer processes the
    /// image as one piece.
    #[test]
    fn test_single_tile_fallback() {
        for &(w, h) in &[(1, 1), (100, 100), (640, 3)] {
            let plan = plan(w, h, 0, 12).unwrap();
            assert_eq!(plan.len(), 1);
            let tile = plan.tile(0).unwrap();
            assert_eq!((tile.core.width, tile.core.height), (w, h));
            assert_eq!(tile.border, 0);
        }
    }

    // ========================================================================
    // GAP 2: Concrete run scenarios
    // ========================================================================

    /// If this breaks, it means: a 2x2 grid run skipped or repeated a tile.
    /// Every sample must be incremented exactly once.
    #[test]
    fn test_scenario_four_tiles_four_workers() {
        let mut image = ImageBuffer::filled(512, 512, 3, 10).unwrap();
        let plan = plan(512, 512, 256, 4).unwrap();
        assert_eq!(plan.len(), 4);
        for tile in plan.iter() {
            assert_eq!((tile.core.width, tile.core.height), (256, 256));
        }
        assert_eq!(plan.tile(0).unwrap().bordered.x, 0);
        assert_eq!(plan.tile(3).unwrap().bordered.right(), 512);

        let controller = RunController::new(
            RunConfig::new().tile_size(256).tile_border(4).workers(4),
        )
        .unwrap();
        let kernel = Recorder::default();
        let result = controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, NoProgress)
            .unwrap();

        assert_eq!(result, RunResult::Completed);
        let mut seen = kernel.seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(0, 0), (0, 1), (0, 2), (0, 3)]);
        assert!(image.as_slice().iter().all(|&v| v == 11));
    }

    fn run_untiled(workers: usize) {
        let mut image = ImageBuffer::filled(100, 100, 1, 0).unwrap();
        let controller =
            RunController::new(RunConfig::new().tile_size(0).workers(workers)).unwrap();
        let kernel = Recorder::default();
        let result = controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, NoProgress)
            .unwrap();
        assert_eq!(result, RunResult::Completed);
        assert_eq!(kernel.seen.into_inner().unwrap(), vec![(0, 0)]);
        assert!(image.as_slice().iter().all(|&v| v == 1));
    }

    /// If this breaks, it means: the untiled path spawns extra workers or
    /// runs the kernel more than once.
    #[test]
    fn test_scenario_untiled_single_worker() {
        run_untiled(8);
    }

    /// If this breaks, it means: the untiled path depends on a worker count
    /// above one to get its single tile processed.
    #[test]
    fn test_scenario_untiled_with_one_configured_worker() {
        run_untiled(1);
    }

    /// Stops the run from inside the kernel when a given iteration starts.
    struct StopDuring {
        iteration: usize,
        handle: StopHandle,
        seen: Mutex<Vec<usize>>,
    }

    impl TileKernel for StopDuring {
        fn apply(
            &self,
            _tile: &mut TileBuffer,
            ctx: &KernelContext<'_>,
        ) -> Result<TileStatus, KernelError> {
            self.seen.lock().unwrap().push(ctx.iteration());
            if ctx.iteration() == self.iteration {
                self.handle.stop();
            }
            Ok(TileStatus::Done)
        }
    }

    /// If this breaks, it means: a stop during iteration 2 of 3 still lets
    /// iteration 3 dispatch tiles.
    #[test]
    fn test_scenario_stop_during_second_iteration() {
        let controller =
            RunController::new(RunConfig::new().tile_size(8).iterations(3)).unwrap();
        let kernel = StopDuring {
            iteration: 1,
            handle: controller.stop_handle(),
            seen: Mutex::new(Vec::new()),
        };
        let mut image = ImageBuffer::new(32, 32, 1).unwrap();
        let result = controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, NoProgress)
            .unwrap();

        assert_eq!(result, RunResult::Cancelled);
        assert_eq!(controller.phase(), RunPhase::Cancelled);
        let seen = kernel.seen.into_inner().unwrap();
        assert!(seen.contains(&1));
        assert!(!seen.contains(&2), "third iteration dispatched: {seen:?}");
    }

    // ========================================================================
    // GAP 3: Progress and cancellation
    // ========================================================================

    /// If this breaks, it means: the progress bar jumps backwards between
    /// polls or across iterations, or never reaches 100.
    #[test]
    fn test_progress_is_monotonic() {
        let controller = RunController::new(
            RunConfig::new()
                .tile_size(8)
                .workers(2)
                .iterations(2)
                .poll_interval(Duration::from_millis(1))
                .report_every(1),
        )
        .unwrap();
        let kernel = Slow {
            steps: 4,
            step: Duration::from_millis(1),
        };
        let mut image = ImageBuffer::new(32, 32, 1).unwrap();
        let mut reports = Vec::new();
        let result = controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, |p| {
                reports.push(p)
            })
            .unwrap();

        assert_eq!(result, RunResult::Completed);
        assert!(reports.windows(2).all(|w| w[0] <= w[1]), "{reports:?}");
        assert!(reports.contains(&50));
        assert_eq!(reports.last(), Some(&100));
    }

    /// If this breaks, it means: stop() is ignored while tiles are in flight,
    /// or run() returns while workers are still running.
    #[test]
    fn test_stop_from_other_thread_cancels_promptly() {
        let controller = RunController::new(
            RunConfig::new()
                .tile_size(4)
                .workers(3)
                .iterations(5)
                .poll_interval(Duration::from_millis(2)),
        )
        .unwrap();
        let handle = controller.stop_handle();
        let kernel = Slow {
            steps: 50,
            step: Duration::from_millis(2),
        };
        let mut image = ImageBuffer::new(64, 64, 1).unwrap();

        let result = thread::scope(|s| {
            let run = s.spawn(|| {
                controller.run_with_kernel(
                    &mut image,
                    &Parameters::default(),
                    None,
                    &kernel,
                    NoProgress,
                )
            });
            while !handle.is_running() && !run.is_finished() {
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(20));
            handle.stop();
            run.join().unwrap()
        });

        assert_eq!(result.unwrap(), RunResult::Cancelled);
        assert!(!handle.is_running());
        assert!(controller.progress() < 100);
    }

    // ========================================================================
    // GAP 4: Failure handling
    // ========================================================================

    struct FailAt {
        tile: usize,
        calls: AtomicUsize,
    }

    impl TileKernel for FailAt {
        fn apply(
            &self,
            tile: &mut TileBuffer,
            _ctx: &KernelContext<'_>,
        ) -> Result<TileStatus, KernelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if tile.tile().index == self.tile {
                return Err(KernelError::NonFinite {
                    x: 0,
                    y: 0,
                    channel: 0,
                });
            }
            Ok(TileStatus::Done)
        }
    }

    /// If this breaks, it means: a failing tile is swallowed and the run
    /// reports success, or dispatch continues past the failure.
    #[test]
    fn test_kernel_failure_fails_run_and_stops_dispatch() {
        let controller =
            RunController::new(RunConfig::new().tile_size(8).iterations(2)).unwrap();
        let kernel = FailAt {
            tile: 1,
            calls: AtomicUsize::new(0),
        };
        let mut image = ImageBuffer::new(32, 32, 1).unwrap();
        let result = controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, NoProgress)
            .unwrap();

        match result {
            RunResult::Failed(EngineError::KernelFailure { tile, reason }) => {
                assert_eq!(tile, 1);
                assert!(reason.contains("non-finite"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(kernel.calls.load(Ordering::SeqCst), 2);
    }

    // ========================================================================
    // GAP 5: Determinism and masking with the real kernels
    // ========================================================================

    /// If this breaks, it means: the result depends on scheduling, e.g. a
    /// tile reads a neighbour that another worker already rewrote.
    #[test]
    fn test_workers_do_not_change_result() {
        let source = noisy(48, 40, 3, 5);
        let run = |workers: usize, params: Parameters| {
            let mut image = source.clone();
            let controller = RunController::new(
                RunConfig::new().tile_size(16).tile_border(4).workers(workers).iterations(2),
            )
            .unwrap();
            let result = controller.run(&mut image, &params, None, NoProgress).unwrap();
            assert_eq!(result, RunResult::Completed);
            image
        };

        let diffusion = Parameters::Diffusion(DiffusionParams::new().amplitude(30.0));
        assert_eq!(run(1, diffusion.clone()), run(4, diffusion));

        let patch = Parameters::PatchBased(PatchParams::new());
        assert_eq!(run(1, patch.clone()), run(3, patch));
    }

    /// If this breaks, it means: inpainting modifies known pixels, which
    /// must act as fixed boundary data.
    #[test]
    fn test_masked_run_keeps_unmasked_pixels() {
        let original = noisy(40, 40, 1, 9);
        let mut data = vec![0u8; 40 * 40];
        for y in 12..28 {
            for x in 5..35 {
                data[y * 40 + x] = 1;
            }
        }
        let mask = InpaintMask::new(40, 40, data).unwrap();
        let mut image = original.clone();
        let controller =
            RunController::new(RunConfig::new().tile_size(16).workers(2)).unwrap();
        let result = controller
            .run(
                &mut image,
                &Parameters::Diffusion(DiffusionParams::inpainting()),
                Some(&mask),
                NoProgress,
            )
            .unwrap();

        assert_eq!(result, RunResult::Completed);
        let mut changed = 0;
        for y in 0..40 {
            for x in 0..40 {
                if mask.is_masked(x, y) {
                    changed += usize::from(image.get(x, y, 0) != original.get(x, y, 0));
                } else {
                    assert_eq!(image.get(x, y, 0), original.get(x, y, 0), "({x}, {y})");
                }
            }
        }
        assert!(changed > 0);
    }

    /// If this breaks, it means: the kernels drift on flat input (bias in
    /// weights or rounding), which accumulates over iterations.
    #[test]
    fn test_constant_image_is_fixed_point_over_iterations() {
        for params in [
            Parameters::Diffusion(DiffusionParams::new().fast_approx(false)),
            Parameters::PatchBased(PatchParams::new()),
        ] {
            let mut image = ImageBuffer::filled(30, 20, 3, 133).unwrap();
            let controller = RunController::new(
                RunConfig::new().tile_size(16).workers(2).iterations(3),
            )
            .unwrap();
            controller.run(&mut image, &params, None, NoProgress).unwrap();
            assert!(image.as_slice().iter().all(|&v| v == 133), "{params:?}");
        }
    }

    /// If this breaks, it means: the default kernel stopped smoothing.
    #[test]
    fn test_regularizer_reduces_noise_across_tiles() {
        let clean = ImageBuffer::filled(48, 48, 1, 120).unwrap();
        let mut image = clean.clone();
        noise::add_gaussian_noise(&mut image, 15.0, &mut StdRng::seed_from_u64(21)).unwrap();
        let before = crate::image::metrics::mse(&clean, &image).unwrap();

        let controller = RunController::new(RunConfig::new().tile_size(16).workers(3)).unwrap();
        let kernel = Regularizer;
        controller
            .run_with_kernel(&mut image, &Parameters::default(), None, &kernel, NoProgress)
            .unwrap();
        let after = crate::image::metrics::mse(&clean, &image).unwrap();
        assert!(after < before / 2.0, "mse {before} -> {after}");
    }
}
