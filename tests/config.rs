use pooled_task::{Automaton, Config, Cx, Error, Prewarm, Step};

struct Capped;

impl Automaton for Capped {
    type Output = u16;

    fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<u16> {
        Step::Complete(3)
    }
}

struct Warmed;

impl Automaton for Warmed {
    type Output = u16;

    fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<u16> {
        Step::Complete(4)
    }
}

struct Background;

impl Automaton for Background {
    type Output = ();

    fn advance(&mut self, _cx: &mut Cx<'_>) -> Step<()> {
        Step::Complete(())
    }
}

fn report(needle: &str) -> pooled_task::PoolReport {
    pooled_task::pool_size_of(needle).unwrap()
}

// Configuration is process-wide, so everything runs in a single test.
#[test]
fn configuration() {
    // Invalid values leave the configuration alone.
    assert!(matches!(
        pooled_task::set_max_pool_size(0),
        Err(Error::InvalidConfig(_))
    ));
    assert!(Config::new().prewarm(8, 4).install().is_err());
    assert_eq!(Config::current(), Config::new());

    // Without prewarming a pool only holds what was returned to it, up to the cap.
    Config::new().no_prewarm().max_pool_size(2).install().unwrap();

    let ops: Vec<_> = (0..4).map(|_| pooled_task::spawn(Capped)).collect();
    assert_eq!(report("Capped").size, 0);
    assert_eq!(report("Capped").capacity, 2);

    for (advance, task) in ops {
        advance.run();
        assert_eq!(task.result().unwrap(), 3);
    }
    assert_eq!(report("Capped").size, 2);

    // Void pools obey the same cap.
    let advances: Vec<_> = (0..3).map(|_| pooled_task::spawn_void(Background)).collect();
    for advance in &advances {
        advance.run();
    }
    assert_eq!(report("Background").size, 2);

    // Lowering the cap applies to existing pools without evicting.
    pooled_task::set_max_pool_size(1).unwrap();
    assert_eq!(report("Capped").capacity, 1);
    assert_eq!(report("Capped").size, 2);
    assert_eq!(Config::current().get_prewarm(), None);

    // Prewarming fills to the target, bounded by the cap.
    Config::new().max_pool_size(8).prewarm(2, 6).install().unwrap();
    assert_eq!(
        Config::current().get_prewarm(),
        Some(Prewarm {
            threshold: 2,
            target: 6
        })
    );

    let (advance, task) = pooled_task::spawn(Warmed);
    assert_eq!(report("Warmed").size, 5);
    advance.run();
    assert_eq!(task.result().unwrap(), 4);
    assert_eq!(report("Warmed").size, 6);

    Config::new().max_pool_size(3).prewarm(16, 32).install().unwrap();
    // An over-full pool drains to the cap as returned runners are rejected.
    for _ in 0..5 {
        let _ = pooled_task::spawn(Warmed);
    }
    assert_eq!(report("Warmed").size, 3);

    let reports = pooled_task::pool_sizes();
    assert!(reports.iter().any(|r| r.shape.contains("Capped")));
    assert!(reports.iter().any(|r| r.shape.contains("Warmed")));
    assert!(reports.iter().any(|r| r.shape.contains("Background")));
}
