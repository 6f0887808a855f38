use acsift::{export, Criterion, OrientationAlgorithm, Sift, SiftConfig};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "acsift",
    about = "Detect, describe and match keypoints between two images"
)]
struct Opt {
    /// Minimum magnitude of the scale-normalized Laplacian.
    #[structopt(short, long, default_value = "0.02")]
    laplacian_threshold: f32,
    /// Harris threshold; 0 keeps every corner-like keypoint.
    #[structopt(long, default_value = "1.0")]
    harris_threshold: f32,
    /// Orientation rule, "max" or "ac".
    #[structopt(long, default_value = "max")]
    orientation: OrientationAlgorithm,
    /// Matching rule: NN-DT, NN-DR, NN-AC or AC.
    #[structopt(short, long, default_value = "NN-DR")]
    criterion: Criterion,
    /// Matches at or above this value are discarded.
    #[structopt(short, long, default_value = "0.8")]
    match_threshold: f64,
    /// Directory receiving keypoints1.txt, keypoints2.txt, descriptors.txt and matches.txt.
    #[structopt(short, long, parse(from_os_str), default_value = ".")]
    output: PathBuf,
    #[structopt(parse(from_os_str))]
    first: PathBuf,
    #[structopt(parse(from_os_str))]
    second: PathBuf,
}

fn main() -> acsift::Result<()> {
    pretty_env_logger::init_timed();
    let opt = Opt::from_args();
    let mut sift = Sift::new(SiftConfig {
        harris_threshold: opt.harris_threshold,
        orientation: opt.orientation,
        criterion: opt.criterion,
        match_threshold: opt.match_threshold,
        ..SiftConfig::new(opt.laplacian_threshold)
    });
    let first = sift.add_path(&opt.first)?;
    let second = sift.add_path(&opt.second)?;
    sift.run()?;
    let matches = sift.match_images(first, second)?;

    let create = |name: &str| -> acsift::Result<BufWriter<File>> {
        Ok(BufWriter::new(File::create(opt.output.join(name))?))
    };
    export::write_keypoints(create("keypoints1.txt")?, sift.keypoints(first)?)?;
    export::write_keypoints(create("keypoints2.txt")?, sift.keypoints(second)?)?;
    let mut descriptors = create("descriptors.txt")?;
    for keypoint in sift.keypoints(first)? {
        for scheme in &sift.config.descriptors {
            export::write_descriptors(&mut descriptors, keypoint, scheme.name())?;
        }
    }
    export::write_matches(create("matches.txt")?, &matches)?;
    println!(
        "{} and {} keypoints, {} matches",
        sift.keypoints(first)?.len(),
        sift.keypoints(second)?.len(),
        matches.len()
    );
    Ok(())
}
