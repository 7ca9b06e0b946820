use clap::{ value_parser, Arg, ArgAction, Command };
use tracing_subscriber::EnvFilter;

use std::error::Error;
use std::fs;
use std::path::{ Path, PathBuf };
use std::time::Instant;

use lpr_rust::{ annotate, load_font, Lpr, LprConfig, TesseractCli };

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = Command::new("lpr")
                    .version(env!("CARGO_PKG_VERSION"))
                    .author("kingrong")
                    .about("Locate license plates in images and read their text")
                    .arg(Arg::new("INPUT")
                        .help("image file, or a directory of images")
                        .value_parser(value_parser!(PathBuf))
                        .required_unless_present("check")
                        .index(1))
                    .arg(Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("directory for annotated images and plate crops")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("output"))
                    .arg(Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("TOML file overriding detector and recognizer settings")
                        .value_parser(value_parser!(PathBuf)))
                    .arg(Arg::new("tesseract")
                        .long("tesseract")
                        .help("tesseract executable to use")
                        .value_parser(value_parser!(PathBuf)))
                    .arg(Arg::new("font")
                        .long("font")
                        .help("TrueType font for drawing plate text on the annotated image")
                        .value_parser(value_parser!(PathBuf)))
                    .arg(Arg::new("check")
                        .long("check")
                        .help("check the tesseract installation and exit")
                        .action(ArgAction::SetTrue))
                    .get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => LprConfig::load(path)?,
        None => LprConfig::default(),
    };
    if let Some(tesseract) = matches.get_one::<PathBuf>("tesseract") {
        config.recognizer.tesseract = tesseract.clone();
    }

    if matches.get_flag("check") {
        let engine = TesseractCli::new(config.recognizer.tesseract.clone());
        let version = engine.version()?;
        println!("found {} at {}", version, engine.command().display());
        return Ok(());
    }

    let input = matches.get_one::<PathBuf>("INPUT").ok_or("input is required")?;
    let output = matches.get_one::<PathBuf>("output").ok_or("output is required")?;
    let font = match matches.get_one::<PathBuf>("font") {
        Some(path) => Some(load_font(path)?),
        None => None,
    };
    fs::create_dir_all(output)?;

    let lpr = Lpr::new(config);
    let run = Run { lpr: &lpr, output, font: font.as_ref() };
    if input.is_dir() {
        run.directory(input)
    } else {
        run.image(input).map(|_| ())
    }
}

struct Run<'a> {
    lpr: &'a Lpr,
    output: &'a Path,
    font: Option<&'a ab_glyph::FontVec>,
}

impl<'a> Run<'a> {

    /// Returns how many plates were read.
    fn image(&self, path: &Path) -> Result<usize, Box<dyn Error>> {
        let name = path.file_name().ok_or("input has no file name")?.to_string_lossy().into_owned();
        let img = image::open(path)?;
        println!("Processing image: {}", path.display());

        let readings = self.lpr.recognize(&img)?;
        for (i, reading) in readings.iter().enumerate() {
            match reading.confidence {
                Some(confidence) => println!("Plate {}: {} ({:.1})", i + 1, reading.text, confidence),
                None => println!("Plate {}: {}", i + 1, reading.text),
            }
            let plate_path = self.output.join(format!("plate_{}_{}.png", name, i + 1));
            reading.processed.save(&plate_path)?;
        }
        if readings.is_empty() {
            println!("No license plates detected in the image.");
        }

        let annotated_path = self.output.join(format!("annotated_{}", name));
        annotate(&img, &readings, self.font).save(&annotated_path)?;
        println!("Annotated image saved: {}", annotated_path.display());
        Ok(readings.len())
    }

    fn directory(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| has_image_extension(path))
            .collect();
        paths.sort();

        let mut total_amount = 0;
        let mut success = 0;
        let mut total_millis = 0;
        for path in &paths {
            let before = Instant::now();
            match self.image(path) {
                Ok(found) => {
                    total_amount += 1;
                    total_millis += before.elapsed().as_millis();
                    if found > 0 {
                        success += 1;
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipped"),
            }
        }
        let average_millis = if total_amount > 0 { total_millis / total_amount as u128 } else { 0 };
        println!("total_amount: {}, success: {}, average_speed: {}ms", total_amount, success, average_millis);
        Ok(())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map_or(false, |ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}
