// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresentError {
    /// The surface reported no formats or no present modes.
    #[error("no compatible surface configuration: {0}")]
    NoCompatibleSurfaceConfiguration(&'static str),

    #[error("no physical device exposes graphics and present queues for this surface")]
    NoSuitableQueue,

    /// Acquire or present reported the chain out of date. Absorbed by recreation.
    #[error("surface is out of date")]
    SurfaceStale,

    #[error("presentation failure in {op}: {result:?}")]
    PresentationFailure { op: &'static str, result: vk::Result },

    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    SurfaceStale,
    PresentationFailure,
}

impl PresentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PresentError::NoCompatibleSurfaceConfiguration(_) | PresentError::NoSuitableQueue => {
                ErrorKind::Configuration
            }
            PresentError::SurfaceStale => ErrorKind::SurfaceStale,
            PresentError::PresentationFailure { .. } | PresentError::Vulkan(_) => {
                ErrorKind::PresentationFailure
            }
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::SurfaceStale
    }
}

pub type PresentResult<T> = std::result::Result<T, PresentError>;
