use burn::backend::NdArray;
use burn::prelude::{Backend, Tensor};
use burn::tensor::Distribution;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vovnet::cache::disk::DiskCacheConfig;
use vovnet::models::vovnet::prefabs::PREFAB_VOVNET_MAP;
use vovnet::models::vovnet::{FeatureKey, VoVNet};

/// Build a `VoVNet` prefab and print the shapes of its feature maps.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Prefab name.
    #[arg(long, default_value = "vovnet39")]
    prefab: String,

    /// Pretrained weights name, e.g. ``in1k``.
    #[arg(long)]
    pretrained: Option<String>,

    /// List the prefabs and exit.
    #[arg(long)]
    list: bool,

    /// Input height.
    #[arg(long, default_value = "224")]
    height: usize,

    /// Input width.
    #[arg(long, default_value = "224")]
    width: usize,

    /// Input batch size.
    #[arg(long, default_value = "1")]
    batch_size: usize,

    /// Random seed for the input image.
    #[arg(long, default_value = "0")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.list {
        for name in PREFAB_VOVNET_MAP.names() {
            let prefab = PREFAB_VOVNET_MAP.try_lookup_prefab(name)?;
            let weights = prefab
                .weights
                .as_ref()
                .map(|w| w.names().join(", "))
                .unwrap_or_default();
            println!("{:<16} {} [{}]", prefab.name, prefab.description, weights);
        }
        return Ok(());
    }

    type B = NdArray<f32>;
    let device = Default::default();
    B::seed(args.seed);

    let prefab = PREFAB_VOVNET_MAP.try_lookup_prefab(&args.prefab)?;
    let model: VoVNet<B> = match &args.pretrained {
        Some(weights) => prefab.init_pretrained(weights, &DiskCacheConfig::default(), &device)?,
        None => prefab.new_config().to_structure().init(&device),
    };

    let resolutions = model.feature_resolutions([args.height, args.width]);
    let shapes = model.output_shape();

    let input: Tensor<B, 4> = Tensor::random(
        [args.batch_size, model.in_channels(), args.height, args.width],
        Distribution::Default,
        &device,
    );
    tracing::info!(prefab = %prefab.name, dims = ?input.dims(), "forward");
    let features = model.forward(input);

    println!("{:<6} {:>8} {:>6} {:>12}  dims", "key", "channels", "stride", "resolution");
    for key in FeatureKey::ALL {
        let spec = shapes[key.name()];
        let [height, width] = resolutions[key.name()];
        println!(
            "{:<6} {:>8} {:>6} {:>12}  {:?}",
            key.name(),
            spec.channels,
            spec.stride,
            format!("{height}x{width}"),
            features.get(key).dims(),
        );
    }

    Ok(())
}
