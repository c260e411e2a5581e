// SPDX-License-Identifier: CEPL-1.0
//! Top-level driver: pump events, run one frame, repeat until close.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::chain::{ChainSettings, PresentationChain};
use crate::error::PresentResult;
use crate::gpu::Gpu;
use crate::scheduler::{FrameScheduler, FrameStatus};
use crate::window::WindowProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Closing,
    Stopped,
}

/// Counts presented frames and reports the total once per interval.
#[derive(Debug)]
struct FrameRate {
    frames: u32,
    since: Instant,
}

impl FrameRate {
    const INTERVAL: Duration = Duration::from_secs(1);

    fn new(now: Instant) -> Self {
        Self { frames: 0, since: now }
    }

    fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames = self.frames.saturating_add(1);
        if now.duration_since(self.since) < Self::INTERVAL {
            return None;
        }
        let frames = self.frames;
        self.frames = 0;
        self.since = now;
        Some(frames)
    }
}

/// Owns the device, the window and everything built on them.
///
/// Field order is drop order: the device (and its surface) goes before the
/// window it was created from.
pub struct PresentationLoop<G: Gpu, W: WindowProvider> {
    gpu: G,
    window: W,
    chain: PresentationChain,
    scheduler: Option<FrameScheduler>,
    state: LoopState,
}

impl<G: Gpu, W: WindowProvider> PresentationLoop<G, W> {
    pub fn new(
        gpu: G,
        window: W,
        settings: ChainSettings,
        frames_in_flight: usize,
    ) -> PresentResult<Self> {
        match build_parts(&gpu, &window, settings, frames_in_flight) {
            Ok((chain, scheduler)) => Ok(Self {
                gpu,
                window,
                chain,
                scheduler: Some(scheduler),
                state: LoopState::Running,
            }),
            Err(e) => {
                drop(gpu);
                drop(window);
                Err(e)
            }
        }
    }

    #[inline]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[inline]
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    #[inline]
    pub fn window(&self) -> &W {
        &self.window
    }

    #[inline]
    pub fn chain(&self) -> &PresentationChain {
        &self.chain
    }

    /// Runs until close is requested or a fatal error occurs. Either way the
    /// device is idled and every resource released before returning.
    pub fn run(&mut self) -> PresentResult<()> {
        if self.state != LoopState::Running {
            return Ok(());
        }
        info!("presentation loop running");
        let outcome = self.drive();
        if let Err(e) = &outcome {
            error!("fatal presentation error: {e}");
        }
        let teardown = self.shutdown();
        outcome.and(teardown)
    }

    fn drive(&mut self) -> PresentResult<()> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(());
        };
        let mut rate = FrameRate::new(Instant::now());
        loop {
            self.window.pump_events();
            if self.window.close_requested() {
                info!("close requested");
                return Ok(());
            }
            match scheduler.draw_frame(&self.gpu, &mut self.chain, &mut self.window)? {
                FrameStatus::Presented { .. } | FrameStatus::PresentedAndRecreated { .. } => {
                    if let Some(fps) = rate.tick(Instant::now()) {
                        info!("fps ~ {fps}");
                    }
                }
                FrameStatus::Abandoned => {}
                FrameStatus::Cancelled => return Ok(()),
            }
        }
    }

    fn shutdown(&mut self) -> PresentResult<()> {
        if self.state == LoopState::Stopped {
            return Ok(());
        }
        self.state = LoopState::Closing;
        debug!("closing: waiting for device idle");
        let idle = self.gpu.wait_idle();
        if let Err(e) = &idle {
            warn!("wait_idle failed during shutdown: {e}");
        }
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.destroy(&self.gpu);
        }
        self.chain.destroy(&self.gpu);
        self.state = LoopState::Stopped;
        info!("presentation loop stopped");
        idle
    }
}

fn build_parts<G: Gpu, W: WindowProvider>(
    gpu: &G,
    window: &W,
    settings: ChainSettings,
    frames_in_flight: usize,
) -> PresentResult<(PresentationChain, FrameScheduler)> {
    let size = window.framebuffer_size();
    let mut chain = if size.is_zero_area() {
        info!("window starts with zero area; swapchain creation deferred");
        PresentationChain::deferred(settings)
    } else {
        PresentationChain::build(gpu, size, settings)?
    };
    match FrameScheduler::new(gpu, frames_in_flight, chain.image_count()) {
        Ok(scheduler) => Ok((chain, scheduler)),
        Err(e) => {
            chain.destroy(gpu);
            Err(e)
        }
    }
}

impl<G: Gpu, W: WindowProvider> Drop for PresentationLoop<G, W> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("teardown on drop: {e}");
        }
    }
}
