use active_storage::dtype::{Dtype, Endianness};
use active_storage::order::Order;
use active_storage::{handle, AxisSelector, ChunkIndex, VariableMetadata};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let Ok(path) = std::env::var("ACTIVE_STORAGE_DEMO_FILE") else {
        println!("set ACTIVE_STORAGE_DEMO_FILE to a raw little-endian f64 file to run the demo read");
        return Ok(());
    };

    let meta = VariableMetadata {
        dtype: Dtype::F64,
        endianness: Endianness::Little,
        shape: vec![10, 10, 10],
        chunk_shape: vec![5, 5, 5],
        order: Order::RowMajor,
        filter_pipeline: vec![],
        missing_attrs: Default::default(),
    };

    let mut handle = handle::open(&path, meta, ChunkIndex::new(), handle::OpenOptions::default()).await?;
    handle.set_method(Some("mean"))?;

    let selection = vec![
        AxisSelector::Slice { start: 0, stop: 2, step: 1 },
        AxisSelector::Slice { start: 4, stop: 6, step: 1 },
        AxisSelector::Slice { start: 7, stop: 9, step: 1 },
    ];

    match handle.get(selection).await {
        Ok(result) => println!("{result:?}"),
        Err(e) => println!("get failed (expected without a populated ChunkIndex): {e}"),
    }

    Ok(())
}
