use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use depth_feed::parser::{FrameReader, MsgType};
use depth_feed::source;

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "data/orders.stream".to_string());
    let mut rd = FrameReader::new(source::open_file(path.as_ref())?);

    let mut syms = BTreeSet::new();
    let mut by_type = BTreeMap::<char, u64>::new();

    while let Some(f) = rd.next_frame().await? {
        syms.insert(f.symbol);
        *by_type.entry(f.msg_type.to_wire() as char).or_default() += 1;
    }

    let st = rd.stats();
    println!("unique_symbols={}", syms.len());
    for t in [MsgType::Add, MsgType::Update, MsgType::Delete, MsgType::Execute] {
        let c = t.to_wire() as char;
        println!("{c}={}", by_type.get(&c).copied().unwrap_or(0));
    }
    println!("skipped={}", st.skipped);
    println!("truncated={}", st.truncated);
    println!("bytes={}", st.bytes);
    Ok(())
}
