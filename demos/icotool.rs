use clap::{App, Arg, SubCommand};
use icoframes::{IcoBitmapFrame, IcoFile, IcoFrame, IcoPngFrame};
use std::fs;
use std::path::PathBuf;

//===========================================================================//

fn main() {
    env_logger::init();
    let matches = App::new("icotool")
        .version("0.1")
        .about("Inspects and builds ICO files")
        .subcommand(
            SubCommand::with_name("create")
                .about("Creates an ICO file from BMP and PNG files")
                .arg(
                    Arg::with_name("output")
                        .takes_value(true)
                        .value_name("PATH")
                        .short("o")
                        .long("output")
                        .help("Sets output path"),
                )
                .arg(
                    Arg::with_name("mask")
                        .takes_value(true)
                        .value_name("PATH")
                        .short("m")
                        .long("mask")
                        .multiple(true)
                        .number_of_values(1)
                        .help("Adds a mask BMP, used by BMP images in order"),
                )
                .arg(Arg::with_name("image").multiple(true).required(true)),
        )
        .subcommand(
            SubCommand::with_name("extract")
                .about("Extracts a frame from an ICO file")
                .arg(
                    Arg::with_name("output")
                        .takes_value(true)
                        .value_name("PATH")
                        .short("o")
                        .long("output")
                        .help("Sets output path"),
                )
                .arg(
                    Arg::with_name("part")
                        .takes_value(true)
                        .long("part")
                        .possible_values(&["composite", "original", "mask"])
                        .default_value("composite")
                        .help("Selects which bitmap of a BMP frame to write"),
                )
                .arg(Arg::with_name("ico").required(true))
                .arg(Arg::with_name("index").required(true)),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Lists frames in an ICO file")
                .arg(Arg::with_name("ico").required(true)),
        )
        .get_matches();
    if let Some(submatches) = matches.subcommand_matches("create") {
        let out_path = if let Some(path) = submatches.value_of("output") {
            PathBuf::from(path)
        } else {
            let mut path = PathBuf::from("out.ico");
            let mut index: i32 = 0;
            while path.exists() {
                index += 1;
                path = PathBuf::from(format!("out{}.ico", index));
            }
            path
        };
        let mut masks = submatches.values_of("mask").into_iter().flatten();
        let mut file = IcoFile::new();
        for path in submatches.values_of("image").into_iter().flatten() {
            println!("Adding {:?}", path);
            let data = fs::read(path).unwrap();
            if icoframes::png::is_supported(&data) {
                file.add_frame(IcoPngFrame::create_from_image(&data).unwrap());
            } else {
                let mask = masks.next().map(|path| fs::read(path).unwrap());
                let frame =
                    IcoBitmapFrame::create_from_images(&data, mask.as_deref())
                        .unwrap();
                file.add_frame(frame);
            }
        }
        let out_file = fs::File::create(out_path).unwrap();
        file.write(out_file).unwrap();
    } else if let Some(submatches) = matches.subcommand_matches("extract") {
        let path = submatches.value_of("ico").unwrap();
        let file = IcoFile::read(fs::File::open(path).unwrap()).unwrap();
        let index = submatches.value_of("index").unwrap();
        let index = index.parse::<usize>().unwrap();
        let (data, extension) = match file.frames()[index] {
            IcoFrame::Png(ref frame) => (frame.image_data(), "png"),
            IcoFrame::Bitmap(ref frame) => {
                let data = match submatches.value_of("part") {
                    Some("original") => frame.original_image_data(),
                    Some("mask") => frame.mask_image_data(),
                    _ => frame.image_data(),
                };
                (data, "bmp")
            }
        };
        let out_path = if let Some(path) = submatches.value_of("output") {
            PathBuf::from(path)
        } else {
            PathBuf::from(format!("{}.{}.{}", path, index, extension))
        };
        fs::write(out_path, data).unwrap();
    } else if let Some(submatches) = matches.subcommand_matches("list") {
        let path = submatches.value_of("ico").unwrap();
        let file = IcoFile::read(fs::File::open(path).unwrap()).unwrap();
        for (index, frame) in file.frames().iter().enumerate() {
            let kind = if frame.is_png() { "PNG" } else { "BMP" };
            println!(
                "{:5}: {}x{} {}, {} bpp, {} bytes",
                index,
                frame.width(),
                frame.height(),
                kind,
                frame.bit_count(),
                frame.frame_length()
            );
        }
    }
}

//===========================================================================//
