use argh::FromArgs;
use framestream::{
    anim::{self, AnimDecoder, Chunk},
    clock::StdClock,
    consts::{ANIM_MAGIC, QOIF2_MAGIC},
    encode::{AnimEncoder, Qoif2Encoder, Thumbnail, MAX_CHUNK_PIXELS},
    qoif2::{self, BlockHeader, Window},
    sink::FrameBuffer,
    stream::IoStream,
    utils::{rgb565_to_rgb888, rgb888_to_rgb565, ByteOrder, LittleEndian},
    BlockOutcome, Clock, DisplaySink, Qoif2Decoder, Qoif2Options, StorageStream, SCREEN_HEIGHT,
    SCREEN_WIDTH,
};
use image::{codecs::gif::GifDecoder, AnimationDecoder, ImageFormat, RgbImage};
use std::{error::Error, fs::File, io::BufReader, path::Path, str::FromStr};
use tracing_subscriber::EnvFilter;

type Result<T, E = Box<dyn Error>> = std::result::Result<T, E>;

/// Inspects, decodes and encodes ANIM (.sda) and QOIF2 (.qox) animations.
#[derive(FromArgs)]
struct Cli {
    /// log decoder internals
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Info(Info),
    Decode(Decode),
    Encode(Encode),
}

/// Prints the headers and the frame/block list of a file.
#[derive(FromArgs)]
#[argh(subcommand, name = "info")]
struct Info {
    /// the input file
    #[argh(positional)]
    input: String,
}

/// Renders one logical frame of a file to an image.
#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
struct Decode {
    /// output format (png, jpg, bmp), png by default
    #[argh(option, default = "Format::Png")]
    format: Format,

    /// index of the logical frame to render
    #[argh(option, default = "0")]
    frame: usize,

    /// render the thumbnail instead (ANIM only)
    #[argh(switch)]
    thumbnail: bool,

    /// the input file
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

/// Encodes an image or an animated GIF.
#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
struct Encode {
    /// output container (qoif2, anim). Guessed from the output extension if missing
    #[argh(option)]
    container: Option<Container>,

    /// duration of a still image in ms
    #[argh(option, default = "0")]
    duration: u16,

    /// also store a thumbnail fitting this many pixels square (ANIM only)
    #[argh(option)]
    thumbnail: Option<u32>,

    /// the input file: PNG, JPG, BMP or GIF
    #[argh(positional)]
    input: String,
    /// the output file
    #[argh(positional)]
    output: String,
}

#[derive(Debug)]
enum Format {
    Png,
    Jpg,
    Bmp,
}

impl FromStr for Format {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(format) = s.eq_ignore_ascii_case("png").then_some(Format::Png)
               .or_else(|| s.eq_ignore_ascii_case("jpg").then_some(Format::Jpg))
               .or_else(|| s.eq_ignore_ascii_case("bmp").then_some(Format::Bmp))
        else { return Err("invalid string"); };

        Ok(format)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Qoif2,
    Anim,
}

impl FromStr for Container {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        #[rustfmt::skip]
        let Some(container) = s.eq_ignore_ascii_case("qoif2").then_some(Container::Qoif2)
               .or_else(|| s.eq_ignore_ascii_case("anim").then_some(Container::Anim))
        else { return Err("invalid string"); };

        Ok(container)
    }
}

impl Container {
    fn from_extension(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("qox") {
            Some(Container::Qoif2)
        } else if ext.eq_ignore_ascii_case("sda") {
            Some(Container::Anim)
        } else {
            None
        }
    }

    fn from_magic(data: &[u8]) -> Result<Self> {
        let magic = LittleEndian::read_u32(data.get(..4).ok_or("file is too short")?);
        match magic {
            QOIF2_MAGIC => Ok(Container::Qoif2),
            ANIM_MAGIC => Ok(Container::Anim),
            _ => Err(format!("unknown magic {magic:#010x}").into()),
        }
    }
}

fn main() -> Result<()> {
    let Cli { verbose, command } = argh::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match command {
        Command::Info(options) => info(options),
        Command::Decode(options) => decode(options),
        Command::Encode(options) => encode(options),
    }
}

fn field<const N: usize>(data: &[u8], at: usize) -> Result<&[u8; N]> {
    data.get(at..at + N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| format!("file is truncated at offset {at}").into())
}

fn info(options: Info) -> Result<()> {
    let data = std::fs::read(&options.input)?;

    match Container::from_magic(&data)? {
        Container::Qoif2 => info_qoif2(&data),
        Container::Anim => info_anim(&data),
    }
}

fn info_qoif2(data: &[u8]) -> Result<()> {
    let header = qoif2::FileHeader::parse(field(data, 0)?);
    println!(
        "QOIF2 v{}: {}x{}, {} channels, colorspace {}",
        header.version, header.width, header.height, header.channels, header.colorspace
    );

    let mut pos = qoif2::FileHeader::SIZE;
    let mut frames = 0;
    loop {
        let offset = pos;
        let bh = BlockHeader::parse(field(data, pos)?);
        pos += BlockHeader::SIZE;

        if bh.is_trailer() {
            let last = *data.get(pos).ok_or("file is truncated in the trailer")?;
            println!("{offset:>8}: trailer{}", if last == 1 { "" } else { " (corrupt)" });
            break;
        }

        let window = if bh.is_big() {
            pos += Window::BIG_SIZE;
            Window::parse_big(field(data, pos - Window::BIG_SIZE)?)
        } else {
            pos += Window::SIZE;
            Window::parse(field(data, pos - Window::SIZE)?)
        };
        if bh.is_start() {
            frames += 1;
        }

        println!(
            "{offset:>8}: block {}x{}+{}+{}, flags {:#04x}, {} bytes{}",
            window.width,
            window.height,
            window.x,
            window.y,
            bh.flags,
            bh.data_len,
            if bh.is_end() {
                format!(", {} ms", bh.duration_ms)
            } else {
                String::new()
            }
        );
        pos += bh.data_len as usize;
    }

    println!("{frames} logical frame(s)");
    Ok(())
}

fn info_anim(data: &[u8]) -> Result<()> {
    let header = anim::FileHeader::parse(field(data, 0)?);
    let image = anim::ImageHeader::parse(field(data, anim::FileHeader::SIZE)?);
    println!(
        "ANIM v{}: {}x{}, {} bpp, flags {:#06x}, frames at {}",
        header.version, image.width, image.height, image.bpp, image.flags, header.header_offset
    );

    let has_thumb = image.flags & framestream::consts::ANIM_IF_HAS_THUMB != 0;
    let mut pos = usize::from(header.header_offset);
    let mut index = 0;
    let mut frames = 0;
    while pos < data.len() {
        let fh = anim::FrameHeader::parse(field(data, pos)?);
        let label = if index == 0 && has_thumb {
            "thumbnail"
        } else {
            if fh.is_end() {
                frames += 1;
            }
            "frame"
        };
        println!(
            "{pos:>8}: {label} {}x{}+{}+{}, flags {:#04x}, {} ms, {} bytes",
            fh.width, fh.height, fh.x, fh.y, fh.flags, fh.duration_ms, fh.data_len
        );
        pos += anim::FrameHeader::SIZE + fh.data_len as usize;
        index += 1;
    }

    println!("{frames} logical frame(s)");
    Ok(())
}

fn decode(options: Decode) -> Result<()> {
    let Decode {
        format,
        frame,
        thumbnail,
        input,
        output,
    } = options;

    let mut magic = [0; 4];
    std::io::Read::read_exact(&mut File::open(&input)?, &mut magic)?;
    println!("Decoding `{input}`");

    let (width, height, pixels) = match Container::from_magic(&magic)? {
        Container::Qoif2 if thumbnail => return Err("QOIF2 thumbnails are not supported".into()),
        Container::Qoif2 => decode_qoif2(&input, frame)?,
        Container::Anim => decode_anim(&input, frame, thumbnail)?,
    };

    let mut rgb888_raw = Vec::with_capacity(pixels.len() * 3);
    for pixel888 in pixels.into_iter().map(rgb565_to_rgb888) {
        rgb888_raw.extend_from_slice(&pixel888);
    }

    RgbImage::from_vec(width, height, rgb888_raw)
        .ok_or("failed to create image")?
        .save_with_format(
            &output,
            match format {
                Format::Png => ImageFormat::Png,
                Format::Jpg => ImageFormat::Jpeg,
                Format::Bmp => ImageFormat::Bmp,
            },
        )?;

    println!("Written {width}x{height} image to `{output}`");

    Ok(())
}

fn open(input: &str) -> Result<IoStream<BufReader<File>>> {
    Ok(IoStream::new(BufReader::new(File::open(input)?))?)
}

fn decode_qoif2(input: &str, frame: usize) -> Result<(u32, u32, Vec<u16>)> {
    let mut stream = open(input)?;
    let mut b = [0; qoif2::FileHeader::SIZE];
    if !stream.read_exact(&mut b) {
        return Err("file header is truncated".into());
    }
    let header = qoif2::FileHeader::parse(&b);
    stream.seek(0);

    // render at the file's own size
    let options = Qoif2Options {
        display_width: header.width,
        display_height: header.height,
    };
    let mut pixels = vec![0u16; header.width as usize * header.height as usize];
    let mut fb = FrameBuffer::new(&mut pixels, header.width, header.height);
    let mut dec: Qoif2Decoder<_, _, _> =
        Qoif2Decoder::open(stream, &mut fb, StdClock::new(), &options)?;

    render_qoif2_frame(&mut dec, frame)?;
    drop(dec);

    Ok((header.width, header.height, pixels))
}

/// Renders blocks until the end of logical frame `frame`. Frames are delimited by their END block,
/// so frames with a 0 ms duration count too.
fn render_qoif2_frame<S, D, C, const R: usize, const P: usize>(
    dec: &mut Qoif2Decoder<S, D, C, R, P>,
    frame: usize,
) -> Result<()>
where
    S: StorageStream,
    D: DisplaySink,
    C: Clock,
{
    let mut done = 0;
    loop {
        let outcome = dec.read_and_render_block()?;

        if dec.last_block().is_end() {
            if done == frame {
                return Ok(());
            }
            done += 1;
        } else if matches!(outcome, BlockOutcome::OneFrame | BlockOutcome::End) {
            return Err(format!("file has only {done} frame(s)").into());
        }
    }
}

/// Expands the chunks of the current frame into the sink. Returns whether the animation looped.
fn render_chunks<S: StorageStream>(
    anim: &mut AnimDecoder<S, StdClock>,
    sink: &mut impl DisplaySink,
    buf: &mut [u16],
) -> Result<bool, anim::AnimError> {
    loop {
        match anim.read_pixel_chunk(buf)? {
            Chunk::Pixels(n) => sink.write_pixels(&buf[..n], false),
            Chunk::End { looped } => return Ok(looped),
        }
    }
}

fn decode_anim(input: &str, frame: usize, thumbnail: bool) -> Result<(u32, u32, Vec<u16>)> {
    let mut anim = AnimDecoder::open(open(input)?, StdClock::new())?;
    let mut buf = vec![0u16; MAX_CHUNK_PIXELS];

    if thumbnail {
        anim.seek_thumbnail()?;
        let fh = anim.read_frame_header()?;
        let (width, height) = (u32::from(fh.width), u32::from(fh.height));
        let mut pixels = vec![0u16; fh.pixel_count()];
        let mut fb = FrameBuffer::new(&mut pixels, width, height);
        fb.set_window(0, 0, width, height);
        render_chunks(&mut anim, &mut fb, &mut buf)?;
        return Ok((width, height, pixels));
    }

    anim.begin_frames()?;
    let (width, height) = (u32::from(anim.width()), u32::from(anim.height()));
    let mut pixels = vec![0u16; width as usize * height as usize];
    let mut fb = FrameBuffer::new(&mut pixels, width, height);

    let mut done = 0;
    loop {
        let fh = anim.read_frame_header()?;
        fb.set_window(fh.x.into(), fh.y.into(), fh.width.into(), fh.height.into());
        let looped = render_chunks(&mut anim, &mut fb, &mut buf)?;

        if !anim.is_animated() || fh.is_end() {
            if done == frame {
                break;
            }
            done += 1;
        }
        if !anim.is_animated() || looped {
            return Err(format!("file has only {done} frame(s)").into());
        }
    }

    Ok((width, height, pixels))
}

/// Frames of the input with their durations in ms.
fn load_frames(input: &str, still_duration: u16) -> Result<Vec<(RgbImage, u16)>> {
    let reader = image::io::Reader::open(input)?.with_guessed_format()?;

    if reader.format() == Some(ImageFormat::Gif) {
        let frames = GifDecoder::new(BufReader::new(File::open(input)?))?
            .into_frames()
            .collect_frames()?;
        return Ok(frames
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                let ms = (numer / denom.max(1)).min(u32::from(u16::MAX)) as u16;
                let rgb = image::DynamicImage::ImageRgba8(frame.into_buffer()).into_rgb8();
                (rgb, ms)
            })
            .collect());
    }

    Ok(vec![(reader.decode()?.into_rgb8(), still_duration)])
}

fn to_rgb565(image: &RgbImage) -> Vec<u16> {
    image.pixels().map(|p| rgb888_to_rgb565(p.0)).collect()
}

fn encode(options: Encode) -> Result<()> {
    let Encode {
        container,
        duration,
        thumbnail,
        input,
        output,
    } = options;

    let container = container
        .or_else(|| Container::from_extension(&output))
        .ok_or("can't tell the container from the output name, pass --container")?;

    let frames = load_frames(&input, duration)?;
    let (first, _) = frames.first().ok_or("input has no frames")?;
    let (width, height) = first.dimensions();

    println!("Encoding {width}x{height} image, {} frame(s)", frames.len());
    if container == Container::Qoif2 && (width, height) != (SCREEN_WIDTH, SCREEN_HEIGHT) {
        log::warn!("the firmware only plays {SCREEN_WIDTH}x{SCREEN_HEIGHT} QOIF2 files");
    }

    let pixels: Vec<(Vec<u16>, u16)> = frames
        .iter()
        .map(|(image, ms)| (to_rgb565(image), *ms))
        .collect();

    let v = match container {
        Container::Qoif2 => {
            let mut enc = Qoif2Encoder::new(width, height);
            enc.push_frame(&pixels[0].0, pixels[0].1)?;
            for pair in pixels.windows(2) {
                enc.push_frame_delta(&pair[0].0, &pair[1].0, pair[1].1)?;
            }
            enc.finish()
        }
        Container::Anim => {
            if width > u16::MAX as u32 || height > u16::MAX as u32 {
                return Err("image dimensions are too large".into());
            }

            let thumb = thumbnail.map(|size| {
                let scale = f64::from(size) / f64::from(width.max(height));
                let tw = ((f64::from(width) * scale) as u32).max(1);
                let th = ((f64::from(height) * scale) as u32).max(1);
                let image = image::imageops::thumbnail(first, tw, th);
                (tw as u16, th as u16, to_rgb565(&image))
            });

            let mut enc = AnimEncoder::new(
                width as u16,
                height as u16,
                thumb.as_ref().map(|(width, height, pixels)| Thumbnail {
                    width: *width,
                    height: *height,
                    pixels,
                }),
            )?;
            enc.push_frame(&pixels[0].0, pixels[0].1)?;
            for pair in pixels.windows(2) {
                enc.push_frame_delta(&pair[0].0, &pair[1].0, pair[1].1)?;
            }
            enc.finish()
        }
    };

    std::fs::write(&output, &v)?;
    println!("Written {} bytes to `{output}`", v.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use framestream::stream::SliceStream;

    fn decode_frame(file: &[u8], frame: usize) -> Result<Vec<u16>> {
        let mut pixels = vec![0u16; 4];
        let mut fb = FrameBuffer::new(&mut pixels, 2, 2);
        let options = Qoif2Options {
            display_width: 2,
            display_height: 2,
        };
        let mut dec = Qoif2Decoder::<_, _, _, 64, 4>::open(
            SliceStream::new(file),
            &mut fb,
            StdClock::new(),
            &options,
        )?;
        render_qoif2_frame(&mut dec, frame)?;
        drop(dec);
        Ok(pixels)
    }

    #[test]
    fn frames_without_duration_are_still_counted() {
        let frames = [[1, 2, 3, 4], [5, 6, 7, 8], [5, 6, 7, 9]];
        let mut enc = Qoif2Encoder::new(2, 2);
        enc.push_frame(&frames[0], 0).unwrap();
        for pair in frames.windows(2) {
            enc.push_frame_delta(&pair[0], &pair[1], 0).unwrap();
        }
        let file = enc.finish();

        for (i, expected) in frames.iter().enumerate() {
            assert_eq!(decode_frame(&file, i).unwrap(), expected);
        }
        assert!(decode_frame(&file, 3)
            .unwrap_err()
            .to_string()
            .contains("only 3 frame(s)"));
    }

    #[test]
    fn still_image_has_one_frame() {
        let mut enc = Qoif2Encoder::new(2, 2);
        enc.push_frame(&[1, 2, 3, 4], 0).unwrap();
        let file = enc.finish();

        assert_eq!(decode_frame(&file, 0).unwrap(), [1, 2, 3, 4]);
        assert!(decode_frame(&file, 1).is_err());
    }
}
