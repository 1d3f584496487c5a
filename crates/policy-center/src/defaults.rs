use std::collections::BTreeMap;

use crate::model::{AutoActions, ScoreThresholds, TimingPolicy, WardenConfig};

pub fn default_config() -> WardenConfig {
    let categories = [
        ("hatred", true),
        ("misinformation", true),
        ("violence", true),
        ("fraud", false),
        ("educational", true),
        ("relevance", true),
        ("integrity", true),
        ("clarity", true),
    ]
    .into_iter()
    .map(|(name, enabled)| (name.to_string(), enabled))
    .collect::<BTreeMap<_, _>>();

    WardenConfig {
        server_url: "http://localhost:3000".into(),
        ws_url: "ws://localhost:3000/ws".into(),
        categories,
        score_thresholds: ScoreThresholds {
            hide: 3.0,
            warning: 5.0,
        },
        auto_actions: AutoActions {
            hide_videos: true,
            show_warnings: true,
            use_not_interested: true,
        },
        custom_prompts: Vec::new(),
        log_actions: true,
        timings: TimingPolicy::default(),
    }
}
