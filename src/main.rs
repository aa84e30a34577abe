use std::env;

use nifti_volume::{
    FileFetcher, LoadStatus, Orientation, RenderSession, RendererConfig, WgpuRenderer,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let location = args.next().unwrap_or_else(|| "volume.nii.gz".to_string());
    let preview = args.next().unwrap_or_else(|| "result.png".to_string());

    let renderer = WgpuRenderer::headless(RendererConfig::default())
        .await
        .expect("should have acquired a GPU device");
    let mut session = RenderSession::open(renderer);

    match session.load(&FileFetcher, &location).await {
        Ok(LoadStatus::DisplayedWithFallback(code)) => {
            log::info!("datatype {code} was read as unsigned 8-bit");
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {e}");
            session.close();
            std::process::exit(1);
        }
    }

    if let Some(volume) = session.current_volume() {
        let field = volume.field();
        let image = field
            .get_image_from_axis(
                field.dim().0 / 2,
                Orientation::Axial,
                volume.color(),
                volume.opacity(),
            )
            .expect("should have returned image at center of volume");
        image.save(&preview).expect("should have written the preview");
    }
    session.close();
}
