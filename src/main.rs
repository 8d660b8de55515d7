use std::path::PathBuf;

use dicom_combine::{CombineOptions, VolumeLoader};

fn main() {
    env_logger::init();

    let volume = VolumeLoader::load_from_directory(PathBuf::from("dicom"), &CombineOptions::default())
        .expect("should have loaded files from directory");
    log::info!("combined {} slices into {:?}", volume.num_slices(), volume.dim());
    log::info!("ijk to xyz: {}", volume.affine());

    let image = volume
        .slice_image(volume.num_slices() / 2)
        .expect("should have returned image at center of volume");
    image.save("result.png").expect("should have saved result.png");
}
