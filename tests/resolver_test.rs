//! Resolver orchestration tests against a scripted session
//!
//! Covers strategy ordering, retry bounds, and failure containment without a browser.


use mock_session::{fast_config, MockSession, SiteBehavior, SHOP_URL};
use region_webdriver::{
    AttemptOutcome, LocationResolver, ResolveState, ResolverConfig, SignalSource, StrategyMethod,
    TargetRegion,
};
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_resolve_succeeds_after_one_ui_attempt() {
    let session = MockSession::new(SiteBehavior::default());
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(report.success, "UI selection should reach GB");
    assert_eq!(report.ui_attempts(), 1);
    assert_eq!(session.selector_clicks(), 1);
    assert!(!report.used_forced_navigation());
    assert_eq!(
        report.matched.as_ref().map(|s| s.source),
        Some(SignalSource::ButtonText)
    );
    assert_eq!(
        report.states,
        vec![
            ResolveState::Initial,
            ResolveState::CookieApplied,
            ResolveState::ParamApplied,
            ResolveState::UiRetrying { attempt: 0 },
            ResolveState::Verified {
                success: true,
                final_check: false
            },
        ]
    );

    println!("✅ Resolved after {} UI attempt(s)", report.ui_attempts());
}

#[tokio::test]
async fn test_resolve_exhausts_ui_retries_then_forces_navigation() {
    let session = MockSession::new(SiteBehavior {
        option_appears_on_click: None,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(!report.success);
    assert_eq!(report.ui_attempts(), 3, "1 attempt + 2 retries");
    assert_eq!(session.selector_clicks(), 3);
    assert!(report.used_forced_navigation());
    assert_eq!(
        report.state(),
        ResolveState::Verified {
            success: false,
            final_check: true
        }
    );

    for attempt in report.attempts_for(StrategyMethod::UiSelect) {
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert!(attempt
            .error
            .as_deref()
            .is_some_and(|e| e.contains("Timed out")));
    }

    let gotos = session.calls_starting_with("goto ");
    assert_eq!(gotos.len(), 2, "parameter navigation + forced navigation");
    assert!(gotos[1].contains("forceCountry=GB"));
    assert!(gotos[1].contains("country=GB"));
    assert!(gotos[1].contains("locale=en_GB"));

    // cookies, params, three UI attempts, forced navigation
    assert_eq!(report.attempts.len(), 6);
}

#[tokio::test]
async fn test_cookie_failure_falls_through_to_url_parameters() {
    let session = MockSession::new(SiteBehavior {
        cookie_write_error: true,
        keeps_query: true,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(report.success);
    assert_eq!(report.attempts[0].method, StrategyMethod::SetCookies);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Failed);
    assert!(report.attempts[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("cookie storage unavailable")));
    assert_eq!(report.attempts[1].method, StrategyMethod::NavigateWithParam);
    assert_eq!(report.attempts[1].outcome, AttemptOutcome::Indeterminate);
    assert_eq!(report.ui_attempts(), 0);
    assert_eq!(
        report.matched.as_ref().map(|s| s.source),
        Some(SignalSource::UrlParam)
    );
}

#[tokio::test]
async fn test_resolve_on_correct_session_skips_ui() {
    let session = MockSession::new(SiteBehavior::default())
        .with_page(|page| page.button_text = Some("United Kingdom".to_string()));
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(report.success);
    assert_eq!(report.ui_attempts(), 0);
    assert_eq!(session.selector_clicks(), 0);
    // Cookie and parameter strategies still run
    assert_eq!(session.calls_starting_with("set_cookies").len(), 1);
    assert_eq!(session.calls_starting_with("goto ").len(), 1);
    assert_eq!(report.state(), ResolveState::Verified {
        success: true,
        final_check: false
    });
}

#[tokio::test]
async fn test_persisted_cookies_are_enough() {
    let session = MockSession::new(SiteBehavior {
        keeps_cookies: true,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(report.success);
    assert_eq!(report.ui_attempts(), 0);
    assert_eq!(
        report.matched.as_ref().map(|s| s.source),
        Some(SignalSource::Cookie)
    );

    // Cookies are scoped to the page host when no domain is configured
    let set = session.calls_starting_with("set_cookies");
    assert_eq!(set, vec!["set_cookies 5".to_string()]);
}

#[tokio::test]
async fn test_ui_strategy_with_zero_retries_makes_one_attempt() {
    let session = MockSession::new(SiteBehavior {
        option_appears_on_click: None,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let changed = resolver
        .apply_ui_strategy(&session, &TargetRegion::gb(), 0)
        .await;

    assert!(!changed);
    assert_eq!(session.selector_clicks(), 1);
}

#[tokio::test]
async fn test_ui_strategy_never_exceeds_retry_bound() {
    let session = MockSession::new(SiteBehavior {
        option_appears_on_click: None,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    assert!(
        !resolver
            .apply_ui_strategy(&session, &TargetRegion::gb(), 3)
            .await
    );
    assert_eq!(session.selector_clicks(), 4);
}

#[tokio::test]
async fn test_ui_strategy_stops_at_first_success() {
    let session = MockSession::new(SiteBehavior {
        option_appears_on_click: Some(2),
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    assert!(
        resolver
            .apply_ui_strategy(&session, &TargetRegion::gb(), 3)
            .await
    );
    assert_eq!(session.selector_clicks(), 2);
}

#[tokio::test]
async fn test_missing_selector_is_retried_not_fatal() {
    let session = MockSession::new(SiteBehavior {
        has_selector: false,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 2).await;

    assert!(!report.success);
    assert_eq!(report.ui_attempts(), 3);
    assert!(report
        .attempts_for(StrategyMethod::UiSelect)
        .all(|a| a.error.as_deref().is_some_and(|e| e.contains("Element not found"))));
}

#[tokio::test]
async fn test_navigation_errors_never_escape() {
    let session = MockSession::new(SiteBehavior {
        goto_error: true,
        option_appears_on_click: None,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 1).await;

    assert!(!report.success);
    let param = report
        .attempts_for(StrategyMethod::NavigateWithParam)
        .next()
        .unwrap();
    assert_eq!(param.outcome, AttemptOutcome::Failed);
    let forced = report
        .attempts_for(StrategyMethod::ForcedNavigation)
        .next()
        .unwrap();
    assert_eq!(forced.outcome, AttemptOutcome::Failed);
}

#[tokio::test]
async fn test_idle_timeout_on_final_navigation_counts_as_failure() {
    // The UI click does switch the site, but no wait ever reaches network idle
    let session = MockSession::new(SiteBehavior {
        idle_timeout: true,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 1).await;

    assert!(!report.success);
    assert!(report.used_forced_navigation());
    assert_eq!(report.ui_attempts(), 2);
    // The page would have passed a check; the timed-out final step still fails
    assert!(resolver.is_target_region(&session, &TargetRegion::gb()).await);
}

#[tokio::test]
async fn test_final_check_still_runs_after_navigation_error() {
    // The UI click switches the site but never settles; the forced navigation then errors outright
    let session = MockSession::new(SiteBehavior {
        idle_timeout: true,
        goto_error: true,
        ..Default::default()
    });
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &TargetRegion::gb(), 0).await;

    assert!(report.success, "page already presents as GB");
    assert_eq!(
        report.state(),
        ResolveState::Verified {
            success: true,
            final_check: true
        }
    );
    assert_eq!(report.ui_attempts(), 1);

    let forced = report
        .attempts_for(StrategyMethod::ForcedNavigation)
        .next()
        .unwrap();
    assert_eq!(forced.outcome, AttemptOutcome::Failed);
    assert!(forced
        .error
        .as_deref()
        .is_some_and(|e| e.contains("Navigation failed")));
    assert_eq!(
        report.matched.as_ref().map(|s| s.source),
        Some(SignalSource::ButtonText)
    );
}

#[tokio::test]
async fn test_retry_delay_only_between_attempts() {
    let resolver = LocationResolver::new(ResolverConfig {
        retry_delay_ms: 100,
        ..Default::default()
    });
    let never = || {
        MockSession::new(SiteBehavior {
            option_appears_on_click: None,
            ..Default::default()
        })
    };

    let started = Instant::now();
    resolver
        .apply_ui_strategy(&never(), &TargetRegion::gb(), 2)
        .await;
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "two pauses for three attempts"
    );

    // A single attempt never waits
    let slow = LocationResolver::new(ResolverConfig {
        retry_delay_ms: 10_000,
        ..Default::default()
    });
    let started = Instant::now();
    slow.apply_ui_strategy(&never(), &TargetRegion::gb(), 0).await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_resolve_region_by_code() {
    let session = MockSession::new(SiteBehavior::default())
        .with_page(|page| page.button_text = Some("UK".to_string()));
    let resolver = LocationResolver::new(fast_config());

    assert!(resolver.resolve_region(&session, "uk", 2).await.unwrap());
    assert!(resolver.resolve_region(&session, "GBR", 2).await.is_err());
}

#[tokio::test]
async fn test_individual_strategies_report_completion_only() {
    let resolver = LocationResolver::new(fast_config());
    let target = TargetRegion::gb();

    let session = MockSession::new(SiteBehavior::default());
    assert!(resolver.apply_cookie_strategy(&session, &target).await);
    assert!(resolver.apply_url_parameter_strategy(&session, &target).await);
    // Both completed, neither changed anything the detector can see
    assert!(!resolver.is_target_region(&session, &target).await);

    let broken = MockSession::new(SiteBehavior {
        cookie_write_error: true,
        ..Default::default()
    });
    assert!(!resolver.apply_cookie_strategy(&broken, &target).await);
}

#[tokio::test]
async fn test_url_strategy_uses_configured_shop_off_web_pages() {
    let target = TargetRegion::gb();
    let session = MockSession::new(SiteBehavior::default())
        .with_page(|page| page.url = "about:blank".to_string());

    let unconfigured = LocationResolver::new(fast_config());
    assert!(!unconfigured.apply_url_parameter_strategy(&session, &target).await);

    let configured = LocationResolver::new(ResolverConfig {
        shop_url: Some(SHOP_URL.to_string()),
        ..fast_config()
    });
    assert!(configured.apply_url_parameter_strategy(&session, &target).await);

    let gotos = session.calls_starting_with("goto ");
    assert_eq!(
        gotos,
        vec![format!(
            "goto {}?country=GB&countryCode=GB&locale=en_GB&region=GB",
            SHOP_URL
        )]
    );
}

#[tokio::test]
async fn test_other_regions_resolve_through_their_own_option() {
    let target = TargetRegion::us();
    let session = MockSession::for_target(
        SiteBehavior {
            selected_text: "United States".to_string(),
            ..Default::default()
        },
        &target,
    );
    let resolver = LocationResolver::new(fast_config());

    let report = resolver.resolve(&session, &target, 0).await;

    assert!(report.success);
    assert_eq!(report.target, "US");
    assert_eq!(report.ui_attempts(), 1);
}
