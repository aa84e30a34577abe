//! Ownership of the render surface and the volume displayed on it.
//!
//! A [`RenderSession`] is opened when the viewport mounts and releases its
//! renderer exactly once, through [`RenderSession::close`] or on drop. Each
//! load runs `Loading -> Displayed` or `Loading -> Error`; a failed load
//! never disturbs the volume already on screen.
//!
//! Loads may overlap: [`RenderSession::begin_load`] hands out a
//! [`LoadTicket`] with a monotonically increasing generation and
//! [`RenderSession::finish_load`] only applies the result of the latest one.

use crate::enums::SceneState;
use crate::fetch::{ResourceFetcher, fetch_and_decode};
use crate::renderer::{RendererError, VolumeRenderer};
use crate::scene::SceneVolume;
use crate::volume::ScalarField;
use crate::volume_loader::{DecodeOutcome, VolumeLoaderError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Volume(#[from] VolumeLoaderError),

    #[error(transparent)]
    Renderer(#[from] RendererError),
}

/// Handle for one load request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Displayed,
    /// Displayed after reading an unsupported datatype code as 8-bit.
    DisplayedWithFallback(i16),
    /// A newer load was started; this result was dropped.
    Superseded,
}

struct DisplayedVolume<V> {
    scene: SceneVolume,
    resident: V,
    generation: u64,
}

pub struct RenderSession<R: VolumeRenderer> {
    renderer: Option<R>,
    current: Option<DisplayedVolume<R::Volume>>,
    state: SceneState,
    generation: u64,
    last_error: Option<String>,
}

impl<R: VolumeRenderer> RenderSession<R> {
    /// Take ownership of an acquired renderer.
    pub fn open(renderer: R) -> Self {
        Self {
            renderer: Some(renderer),
            current: None,
            state: SceneState::Empty,
            generation: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.renderer.is_some()
    }

    /// Message of the most recent failed load, cleared when a new load starts.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn current_volume(&self) -> Option<&SceneVolume> {
        self.current.as_ref().map(|displayed| &displayed.scene)
    }

    /// Generation of the load that produced the displayed volume.
    pub fn displayed_generation(&self) -> Option<u64> {
        self.current.as_ref().map(|displayed| displayed.generation)
    }

    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    /// Register a new load request, superseding any in flight.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.generation += 1;
        self.state = SceneState::Loading;
        self.last_error = None;
        LoadTicket {
            generation: self.generation,
        }
    }

    /// Apply the outcome of the load identified by `ticket`.
    ///
    /// # Errors
    ///
    /// Returns the load's own error, or a renderer error if binding the new
    /// volume failed. Either way the previously displayed volume stays.
    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        outcome: Result<DecodeOutcome, VolumeLoaderError>,
    ) -> Result<LoadStatus, LoadError> {
        if ticket.generation != self.generation {
            log::warn!(
                "discarding load {} superseded by load {}",
                ticket.generation,
                self.generation
            );
            return Ok(LoadStatus::Superseded);
        }

        let result = outcome
            .map_err(LoadError::from)
            .and_then(|outcome| {
                let fallback = outcome.fallback_code();
                self.display(outcome.into_field(), ticket.generation)?;
                Ok(match fallback {
                    None => LoadStatus::Displayed,
                    Some(code) => LoadStatus::DisplayedWithFallback(code),
                })
            });

        match &result {
            Ok(_) => self.state = SceneState::Displayed,
            Err(e) => {
                log::error!("load {} failed: {e}", ticket.generation);
                self.state = SceneState::Error;
                self.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Fetch, decode and display the volume at `location`.
    pub async fn load<F>(&mut self, fetcher: &F, location: &str) -> Result<LoadStatus, LoadError>
    where
        F: ResourceFetcher + ?Sized,
    {
        let ticket = self.begin_load();
        let outcome = fetch_and_decode(fetcher, location).await;
        self.finish_load(ticket, outcome)
    }

    /// Swap `field` into the scene: upload, remove the old volume, add the
    /// new one, frame it, redraw.
    ///
    /// Only the upload can fail the swap. Once the new volume is attached a
    /// failed redraw is logged and the volume counts as displayed.
    fn display(&mut self, field: ScalarField, generation: u64) -> Result<(), LoadError> {
        let renderer = self.renderer.as_mut().ok_or(RendererError::Closed)?;
        let scene = SceneVolume::configure(field);
        let resident = renderer.upload(&scene)?;

        if let Some(previous) = self.current.take() {
            renderer.remove_volume(previous.resident);
        }
        renderer.add_volume(&resident);
        renderer.reset_camera(&scene.bounds());

        log::info!(
            "displaying volume {:?} with spacing {:?}",
            scene.geometry().dims,
            scene.geometry().spacing
        );
        self.current = Some(DisplayedVolume {
            scene,
            resident,
            generation,
        });
        if let Err(e) = renderer.render() {
            log::warn!("redraw after displaying load {generation} failed: {e}");
        }
        Ok(())
    }

    /// Release the renderer and everything displayed on it.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(mut renderer) = self.renderer.take() else {
            return;
        };
        if let Some(displayed) = self.current.take() {
            renderer.remove_volume(displayed.resident);
        }
        renderer.release();
        self.state = SceneState::Empty;
    }
}

impl<R: VolumeRenderer> Drop for RenderSession<R> {
    fn drop(&mut self) {
        self.release();
    }
}
