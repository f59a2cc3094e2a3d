use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;

use davis_core::config::RuntimeConfig;
use davis_core::geometry::{ChipId, Geometry, Orientation};
use davis_core::ring::Ring;
use davis_core::Decoder;

#[derive(StructOpt, Debug)]
#[structopt(about = "Decodes a raw DAVIS event log into packet containers.")]
struct Opt {
    #[structopt(long, default_value = "240", help = "DVS/APS sensor width")]
    width: u16,

    #[structopt(long, default_value = "180", help = "DVS/APS sensor height")]
    height: u16,

    #[structopt(long, help = "Assume DAVIS208 high-gain-row polarity inversion")]
    davis208: bool,

    #[structopt(name = "FILE", parse(from_os_str))]
    file: PathBuf,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut f = File::open(&opt.file).with_context(|| format!("failed to open {:?}", opt.file))?;
    let mut buf: Vec<u8> = Vec::new();
    f.read_to_end(&mut buf)
        .with_context(|| format!("failed to read {:?}", opt.file))?;

    let geometry = Geometry {
        dvs_w: opt.width,
        dvs_h: opt.height,
        aps_w: opt.width,
        aps_h: opt.height,
        channels: 1,
        chip_id: if opt.davis208 { ChipId::Davis208 } else { ChipId::Davis346B },
        orientation: Orientation::default(),
        aps_window0_x: 0,
        aps_window0_y: 0,
        aps_window0_w: opt.width,
        aps_window0_h: opt.height,
    };

    let config = Arc::new(RuntimeConfig::new());
    let ring = Arc::new(Ring::new(config.ring_capacity()));
    let mut decoder = Decoder::new(1, geometry, config, Arc::clone(&ring));

    decoder.process_bytes(&buf);

    let mut containers = 0;
    while let Some(container) = ring.get() {
        containers += 1;
        if let Some(polarity) = &container.polarity {
            println!("polarity: {} events", polarity.position());
        }
        if let Some(special) = &container.special {
            println!("special: {} events", special.position());
        }
        if let Some(frame) = &container.frame {
            for f in frame.events() {
                println!("frame: {}x{}", f.width(), f.height());
            }
        }
        if let Some(imu6) = &container.imu6 {
            println!("imu6: {} samples", imu6.position());
        }
    }

    println!("decoded {containers} packet container(s)");

    Ok(())
}
