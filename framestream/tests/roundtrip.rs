use framestream::{
    anim::{AnimDecoder, Chunk, FrameHeader},
    clock::StdClock,
    encode::{AnimEncoder, Qoif2Encoder, Thumbnail, MAX_CHUNK_PIXELS},
    sink::FrameBuffer,
    stream::{IoStream, SliceStream},
    utils::rgb888_to_rgb565,
    BlockOutcome, Clock, DisplaySink, Qoif2Decoder, Qoif2Options, StorageStream,
};

const W: usize = 48;
const H: usize = 40;

/// A gradient background with a square of noise moving across it.
fn frames(count: usize) -> Vec<Vec<u16>> {
    let mut seed = 0x1234_5678u32;
    let mut noise = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (seed >> 16) as u16
    };

    (0..count)
        .map(|n| {
            let mut frame: Vec<u16> = (0..W * H)
                .map(|i| {
                    let (x, y) = (i % W, i / W);
                    rgb888_to_rgb565([(x * 255 / W) as u8, (y * 255 / H) as u8, (n * 40) as u8])
                })
                .collect();
            for y in 4..12 {
                for x in 0..8 {
                    let x = (x + n * 5) % W;
                    frame[y * W + x] = noise();
                }
            }
            frame
        })
        .collect()
}

fn render_anim_frame<S: StorageStream, C: Clock>(
    anim: &mut AnimDecoder<S, C>,
    fb: &mut FrameBuffer,
) -> (FrameHeader, bool) {
    let fh = anim.read_frame_header().unwrap();
    fb.set_window(fh.x.into(), fh.y.into(), fh.width.into(), fh.height.into());

    let mut buf = vec![0u16; MAX_CHUNK_PIXELS];
    let mut written = 0;
    loop {
        match anim.read_pixel_chunk(&mut buf).unwrap() {
            Chunk::Pixels(n) => {
                fb.write_pixels(&buf[..n], false);
                written += n;
            }
            Chunk::End { looped } => {
                assert_eq!(written, fh.pixel_count());
                return (fh, looped);
            }
        }
    }
}

#[test]
fn qoif2_animation_round_trip_and_loop() {
    let frames = frames(4);
    let mut enc = Qoif2Encoder::new(W as u32, H as u32);
    enc.push_frame(&frames[0], 40).unwrap();
    for pair in frames.windows(2) {
        enc.push_frame_delta(&pair[0], &pair[1], 40).unwrap();
    }
    let file = enc.finish();

    let mut pixels = vec![0u16; W * H];
    let mut fb = FrameBuffer::new(&mut pixels, W as u32, H as u32);
    let options = Qoif2Options {
        display_width: W as u32,
        display_height: H as u32,
    };
    // small buffers: the ring wraps and the pixel buffers flip many times per block
    let mut dec = Qoif2Decoder::<_, _, _, 256, 64>::open(
        SliceStream::new(&file),
        &mut fb,
        StdClock::new(),
        &options,
    )
    .unwrap();

    for round in 0..3 {
        for (i, expected) in frames.iter().enumerate() {
            match dec.read_and_render_block().unwrap() {
                BlockOutcome::Delay { .. } => {}
                other => panic!("round {round}, frame {i}: {other:?}"),
            }
            assert!(
                dec.display().pixels() == &expected[..],
                "round {round}, frame {i} differs"
            );
        }
        assert_eq!(dec.read_and_render_block().unwrap(), BlockOutcome::End);
    }
    assert_eq!(dec.frame_count(), 12);
}

#[test]
fn qoif2_still_image_from_io_stream() {
    let width = framestream::SCREEN_WIDTH as usize;
    let height = framestream::SCREEN_HEIGHT as usize;
    let image: Vec<u16> = (0..width * height)
        .map(|i| rgb888_to_rgb565([(i % 251) as u8, (i / width) as u8, 128]))
        .collect();

    let mut enc = Qoif2Encoder::new(width as u32, height as u32);
    enc.push_frame(&image, 0).unwrap();
    let file = enc.finish();

    let stream = IoStream::new(std::io::Cursor::new(file)).unwrap();
    let mut pixels = vec![0u16; width * height];
    let mut fb = FrameBuffer::new(&mut pixels, width as u32, height as u32);
    let mut dec: Qoif2Decoder<_, _, _> =
        Qoif2Decoder::open(stream, &mut fb, StdClock::new(), &Qoif2Options::default()).unwrap();

    assert_eq!(dec.read_and_render_block().unwrap(), BlockOutcome::Continue);
    assert_eq!(dec.read_and_render_block().unwrap(), BlockOutcome::OneFrame);
    assert_eq!(dec.frame_count(), 1);
    drop(dec);

    assert!(fb.pixels() == &image[..]);
}

#[test]
fn anim_animation_round_trip_with_thumbnail() {
    let frames = frames(3);
    let thumb: Vec<u16> = (0..H / 4)
        .flat_map(|y| (0..W / 4).map(move |x| (y * 4, x * 4)))
        .map(|(y, x)| frames[0][y * W + x])
        .collect();

    let mut enc = AnimEncoder::new(
        W as u16,
        H as u16,
        Some(Thumbnail {
            width: (W / 4) as u16,
            height: (H / 4) as u16,
            pixels: &thumb,
        }),
    )
    .unwrap();
    enc.push_frame(&frames[0], 100).unwrap();
    for pair in frames.windows(2) {
        enc.push_frame_delta(&pair[0], &pair[1], 100).unwrap();
    }
    let file = enc.finish();

    let mut anim = AnimDecoder::open(SliceStream::new(&file), StdClock::new()).unwrap();
    assert!(anim.is_animated());
    assert!(anim.has_thumbnail());
    assert_eq!((anim.width(), anim.height()), (W as u16, H as u16));

    let mut thumb_pixels = vec![0u16; thumb.len()];
    let mut thumb_fb = FrameBuffer::new(&mut thumb_pixels, (W / 4) as u32, (H / 4) as u32);
    anim.seek_thumbnail().unwrap();
    render_anim_frame(&mut anim, &mut thumb_fb);
    assert!(thumb_fb.pixels() == &thumb[..]);

    anim.begin_frames().unwrap();
    let mut pixels = vec![0u16; W * H];
    let mut fb = FrameBuffer::new(&mut pixels, W as u32, H as u32);
    for round in 0..2 {
        for (i, expected) in frames.iter().enumerate() {
            let (fh, looped) = render_anim_frame(&mut anim, &mut fb);
            assert!(fh.is_begin() && fh.is_end());
            assert_eq!(fh.duration_ms, 100);
            assert_eq!(looped, i == frames.len() - 1, "round {round}, frame {i}");
            assert!(fb.pixels() == &expected[..], "round {round}, frame {i} differs");
        }
    }
}

#[test]
fn anim_pacing_sleeps_for_the_frame_duration() {
    let mut enc = AnimEncoder::new(2, 2, None).unwrap();
    enc.push_frame(&[1, 2, 3, 4], 30).unwrap();
    let file = enc.finish();

    let mut anim = AnimDecoder::open(SliceStream::new(&file), StdClock::new()).unwrap();
    anim.begin_frames().unwrap();

    let start = std::time::Instant::now();
    let mut pixels = [0u16; 4];
    let mut fb = FrameBuffer::new(&mut pixels, 2, 2);
    render_anim_frame(&mut anim, &mut fb);
    anim.wait_for_frame_duration(&mut framestream::clock::StdDelay);

    // the clock has millisecond resolution
    assert!(start.elapsed() >= std::time::Duration::from_millis(29));
    assert!(anim.remaining_frame_time() <= 0);
}
