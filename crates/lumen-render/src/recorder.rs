// SPDX-License-Identifier: CEPL-1.0
//! Static per-image command recording.
//!
//! Each swapchain image gets one primary buffer encoding the whole frame:
//! begin render pass, bind pipeline, draw 3 vertices / 1 instance, end.
//! Buffers are recorded once per generation and replayed unchanged.

use ash::vk;
use tracing::debug;

use crate::error::PresentResult;
use crate::gpu::{Gpu, GraphicsPipeline};
use crate::targets::RenderTargetSet;

const TRIANGLE_VERTICES: u32 = 3;
const TRIANGLE_INSTANCES: u32 = 1;

#[derive(Debug)]
pub struct CommandRecorder {
    pipeline: GraphicsPipeline,
    buffers: Vec<vk::CommandBuffer>,
    generation: u64,
}

impl CommandRecorder {
    pub fn record<G: Gpu>(
        gpu: &G,
        targets: &RenderTargetSet,
        clear: [f32; 4],
    ) -> PresentResult<Self> {
        let pipeline = gpu.create_pipeline(targets.render_pass(), targets.extent())?;
        let buffers = match gpu.allocate_command_buffers(targets.len() as u32) {
            Ok(buffers) => buffers,
            Err(e) => {
                gpu.destroy_pipeline(pipeline);
                return Err(e);
            }
        };
        let recorder = Self {
            pipeline,
            buffers,
            generation: targets.generation(),
        };

        for (i, target) in targets.iter().enumerate() {
            let cmd = recorder.buffers[i];
            if let Err(e) = record_one(gpu, cmd, targets, target.framebuffer, &pipeline, clear) {
                recorder.destroy(gpu);
                return Err(e);
            }
        }

        debug!(
            "recorded {} command buffers (generation {})",
            recorder.buffers.len(),
            recorder.generation
        );
        Ok(recorder)
    }

    #[inline]
    pub fn command_buffer(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn pipeline(&self) -> &GraphicsPipeline {
        &self.pipeline
    }

    pub fn destroy<G: Gpu>(self, gpu: &G) {
        if !self.buffers.is_empty() {
            gpu.free_command_buffers(&self.buffers);
        }
        gpu.destroy_pipeline(self.pipeline);
    }
}

fn record_one<G: Gpu>(
    gpu: &G,
    cmd: vk::CommandBuffer,
    targets: &RenderTargetSet,
    framebuffer: vk::Framebuffer,
    pipeline: &GraphicsPipeline,
    clear: [f32; 4],
) -> PresentResult<()> {
    gpu.begin_commands(cmd)?;
    gpu.cmd_begin_render_pass(cmd, targets.render_pass(), framebuffer, targets.extent(), clear);
    gpu.cmd_bind_pipeline(cmd, pipeline);
    gpu.cmd_draw(cmd, TRIANGLE_VERTICES, TRIANGLE_INSTANCES);
    gpu.cmd_end_render_pass(cmd);
    gpu.end_commands(cmd)
}
