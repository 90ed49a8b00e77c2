use std::error::Error;

use resight_sdk::api::{ApiClientOptions, AskAiRequest, DashboardApiClient};
use resight_sdk::config::ApiContext;
use resight_sdk::retry::RetryPolicy;

fn main() -> Result<(), Box<dyn Error>> {
    let item_id = "REPLACE_WITH_ITEM_ID".to_string();
    let user_id = "REPLACE_WITH_USER_ID".to_string();
    let new_price = 19.99_f64;
    let clearance_category: Option<&str> = None;

    let context = ApiContext::from_env()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let options = ApiClientOptions {
            retry_policy: RetryPolicy::bounded(3),
            operator: Some("demo@resight.local".to_string()),
            ..ApiClientOptions::default()
        };
        let api = DashboardApiClient::with_options(context, options)?;

        for item in api.fetch_ranked_items(&user_id).await?.iter().take(5) {
            println!(
                "rank={} item_id={} score={:.3} name={}",
                item.rank.map(|rank| rank.to_string()).unwrap_or_default(),
                item.item_id,
                item.score,
                item.name.as_deref().unwrap_or("-"),
            );
        }

        let mut factors: Vec<_> = api.explain_item(&item_id).await?.into_iter().collect();
        factors.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (factor, weight) in factors {
            println!("factor={factor} weight={weight:.2}");
        }

        let whatif = api.simulate_price_change(&item_id, new_price).await?;
        println!(
            "whatif price={new_price} rank_change={} old_rank={:?} new_rank={:?}",
            whatif.rank_change, whatif.old_rank, whatif.new_rank
        );

        let pinned = api.pin_item(&item_id).await?;
        println!("pin status={} rule_id={:?}", pinned.status, pinned.rule_id);

        let boosted = api.boost_clearance(clearance_category).await?;
        println!("boost status={} rule_ids={:?}", boosted.status, boosted.rule_ids);

        let answer = api
            .ask_ai(&AskAiRequest::on_page(
                format!("Why is {item_id} ranked where it is?"),
                "item",
            ))
            .await?;
        println!("{answer}");

        Ok::<(), Box<dyn Error>>(())
    })
}
