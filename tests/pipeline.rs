use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use futures::FutureExt;
use futures::future::BoxFuture;
use ndarray::Array3;
use nifti_volume::{
    Bounds, FileFetcher, LoadError, LoadStatus, RenderSession, RendererError, ResourceFetcher,
    ScalarField, SceneState, SceneVolume, VolumeLoaderError, VolumeRenderer, VolumeWriter,
    VoxelBuffer, fetch_and_decode,
};

/// Renderer that tracks which volumes are attached.
#[derive(Default)]
struct SceneTracker {
    attached: Rc<RefCell<Vec<u32>>>,
    max_attached: Rc<RefCell<usize>>,
    releases: Rc<RefCell<u32>>,
    next: u32,
}

impl VolumeRenderer for SceneTracker {
    type Volume = u32;

    fn upload(&mut self, _volume: &SceneVolume) -> Result<u32, RendererError> {
        self.next += 1;
        Ok(self.next)
    }

    fn add_volume(&mut self, volume: &u32) {
        let mut attached = self.attached.borrow_mut();
        attached.push(*volume);
        let mut max = self.max_attached.borrow_mut();
        *max = (*max).max(attached.len());
    }

    fn remove_volume(&mut self, volume: u32) {
        self.attached.borrow_mut().retain(|v| *v != volume);
    }

    fn reset_camera(&mut self, _bounds: &Bounds) {}

    fn render(&mut self) -> Result<(), RendererError> {
        Ok(())
    }

    fn release(&mut self) {
        *self.releases.borrow_mut() += 1;
    }
}

/// Serves bytes from memory.
#[derive(Default)]
struct MemoryFetcher {
    resources: HashMap<String, Vec<u8>>,
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VolumeLoaderError>> {
        async move {
            self.resources
                .get(location)
                .cloned()
                .ok_or_else(|| VolumeLoaderError::Transport(format!("404 {location}")))
        }
        .boxed()
    }
}

fn cube(side: usize, fill: u8) -> ScalarField {
    ScalarField::from_voxels(
        VoxelBuffer::UInt8(Array3::from_elem((side, side, side), fill)),
        (1.0, 1.0, 2.5),
    )
}

fn fetcher() -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::default();
    let plain = VolumeWriter::encode(&cube(2, 120), false).unwrap();
    let mut short = plain.clone();
    short.pop();

    fetcher.resources.insert("plain.nii".into(), plain);
    fetcher
        .resources
        .insert("packed.nii.gz".into(), VolumeWriter::encode(&cube(2, 120), true).unwrap());
    fetcher
        .resources
        .insert("large.nii".into(), VolumeWriter::encode(&cube(3, 40), false).unwrap());
    fetcher.resources.insert("short.nii".into(), short);
    fetcher
        .resources
        .insert("garbage.bin".into(), b"<html>not found</html>".to_vec());
    fetcher
}

#[tokio::test]
async fn test_gzip_and_plain_display_same_field() {
    let fetcher = fetcher();
    let mut session = RenderSession::open(SceneTracker::default());

    session.load(&fetcher, "plain.nii").await.unwrap();
    let plain = session.current_volume().unwrap().field().clone();
    session.load(&fetcher, "packed.nii.gz").await.unwrap();
    let packed = session.current_volume().unwrap().field().clone();

    assert_eq!(plain, packed);
    assert_eq!(plain.header().spacing, (1.0, 1.0, 2.5));
}

#[tokio::test]
async fn test_at_most_one_volume_attached() {
    let fetcher = fetcher();
    let tracker = SceneTracker::default();
    let attached = tracker.attached.clone();
    let max_attached = tracker.max_attached.clone();
    let mut session = RenderSession::open(tracker);

    for location in ["plain.nii", "large.nii", "packed.nii.gz", "large.nii"] {
        session.load(&fetcher, location).await.unwrap();
        assert_eq!(attached.borrow().len(), 1);
    }
    assert_eq!(*max_attached.borrow(), 1);
}

#[tokio::test]
async fn test_rejected_loads_leave_scene_untouched() {
    let fetcher = fetcher();
    let tracker = SceneTracker::default();
    let attached = tracker.attached.clone();
    let mut session = RenderSession::open(tracker);
    session.load(&fetcher, "large.nii").await.unwrap();

    let err = session.load(&fetcher, "garbage.bin").await.unwrap_err();
    assert!(matches!(err, LoadError::Volume(VolumeLoaderError::Format(_))));
    assert_eq!(session.state(), SceneState::Error);

    let err = session.load(&fetcher, "short.nii").await.unwrap_err();
    assert!(matches!(err, LoadError::Volume(VolumeLoaderError::Decode(_))));

    let err = session.load(&fetcher, "missing.nii").await.unwrap_err();
    assert!(matches!(err, LoadError::Volume(VolumeLoaderError::Transport(_))));
    assert!(session.last_error().unwrap().contains("missing.nii"));

    assert_eq!(*attached.borrow(), vec![1]);
    assert_eq!(session.current_volume().unwrap().geometry().dims, [3, 3, 3]);
}

#[tokio::test]
async fn test_out_of_order_completion_keeps_latest() {
    let fetcher = fetcher();
    let mut session = RenderSession::open(SceneTracker::default());

    let older = session.begin_load();
    let newer = session.begin_load();
    let (older_outcome, newer_outcome) = futures::join!(
        fetch_and_decode(&fetcher, "large.nii"),
        fetch_and_decode(&fetcher, "plain.nii"),
    );

    assert_eq!(
        session.finish_load(newer, newer_outcome).unwrap(),
        LoadStatus::Displayed
    );
    assert_eq!(
        session.finish_load(older, older_outcome).unwrap(),
        LoadStatus::Superseded
    );
    assert_eq!(session.current_volume().unwrap().geometry().dims, [2, 2, 2]);
}

#[tokio::test]
async fn test_release_once_across_close_and_drop() {
    let tracker = SceneTracker::default();
    let releases = tracker.releases.clone();
    let session = RenderSession::open(tracker);
    session.close();
    assert_eq!(*releases.borrow(), 1);

    let tracker = SceneTracker::default();
    let releases = tracker.releases.clone();
    {
        let mut session = RenderSession::open(tracker);
        let _ = session.load(&fetcher(), "short.nii").await;
    }
    assert_eq!(*releases.borrow(), 1);
}

#[tokio::test]
async fn test_file_fetcher_reads_from_disk() {
    let path: PathBuf = std::env::temp_dir().join(format!(
        "nifti-volume-pipeline-{}.nii.gz",
        std::process::id()
    ));
    std::fs::write(&path, VolumeWriter::encode(&cube(2, 7), true).unwrap()).unwrap();

    let mut session = RenderSession::open(SceneTracker::default());
    let location = format!("file://{}", path.display());
    let status = session.load(&FileFetcher, &location).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(status, LoadStatus::Displayed);
    let field = session.current_volume().unwrap().field();
    assert_eq!(field.voxels().value_at((1, 1, 1)), Some(7.0));
}
