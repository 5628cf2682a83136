//! Minimal CollabLite client: attach to an object, optionally hammer it
//! with property updates, and print every confirmation that flows back.
//!
//! ```bash
//! cargo run --example simple_property -- http://127.0.0.1:8000 --send
//! ```

use std::{
    collections::BTreeMap,
    env,
    time::Duration,
};

use bytes::Bytes;
use collablite::{
    converters::KeyValueConverter,
    CollabClient,
    ObjectId,
};
use futures::StreamExt;
use rand::Rng;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let deployment = env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_owned());
    let send = env::args().any(|arg| arg == "--send");

    let object_id: ObjectId = "testobject1".parse()?;
    let client = CollabClient::new(&deployment).await?;
    client.attach(object_id.clone())?;

    // Seed the local document with whatever is already persisted.
    let snapshot = client.get_object(&object_id).await?;
    let mut doc: BTreeMap<String, Bytes> = snapshot
        .properties
        .into_iter()
        .map(|(property_id, data)| (property_id.to_string(), data))
        .collect();
    println!("loaded {} properties", doc.len());

    if send {
        let client = client.clone();
        let object_id = object_id.clone();
        let mut doc = doc.clone();
        tokio::spawn(async move {
            for i in 0u64.. {
                let property = format!("property-{:03}", rand::rng().random_range(0..100));
                doc.insert(property, Bytes::from(format!("hello world-{i}")));
                if let Err(e) = client.send(&KeyValueConverter, object_id.clone(), &doc) {
                    eprintln!("failed to send change: {e:#}");
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
    }

    let mut updates = client.watch();
    while let Some(Ok(update)) = updates.next().await {
        println!(
            "confirmation: {}/{} = {:?} (from {})",
            update.confirmation.object_id,
            update.confirmation.property_id,
            update.confirmation.data,
            update.confirmation.origin_id,
        );
        client.apply_to(&KeyValueConverter, &mut doc)?;
    }
    Ok(())
}
