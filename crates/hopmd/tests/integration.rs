//! Integration tests for the hopmd simulation driver.

use approx::assert_relative_eq;
use hopmd::{
    Atom, CycleOutcome, IntegratorConfig, PairForceField, PairForceFieldConfig, QhopConfig, QhopDatabase,
    SimBox, Simulation, SimulationState, Topology, Vec3,
    hopmd_md::{ConservationMonitor, ConservationState, LjTable, total_momentum},
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spc_force_field() -> PairForceField {
    let lj = LjTable::from_sigma_epsilon(&[(0.3166, 0.650), (0.0, 0.0), (0.0, 0.0)]);
    PairForceField::new(lj, &PairForceFieldConfig::default())
}

/// Rigid SPC-like waters on a cubic grid, alternating translational velocities.
fn water_grid(per_side: usize, spacing: f64) -> (Topology, SimulationState) {
    let mut top = Topology::new();
    let mut x = Vec::new();
    let mut v = Vec::new();
    let mut n = 0;
    for i in 0..per_side {
        for j in 0..per_side {
            for k in 0..per_side {
                let r = top.add_residue("SOL", n as i32 + 1);
                let o = top.add_atom(Atom::new("OW", 15.9994, -0.82, 0, r)).unwrap();
                let h1 = top.add_atom(Atom::new("HW1", 1.008, 0.41, 1, r)).unwrap();
                let h2 = top.add_atom(Atom::new("HW2", 1.008, 0.41, 1, r)).unwrap();
                top.add_settle(o, h1, h2, 0.1, 0.163_299).unwrap();

                let xo = Vec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * spacing;
                x.extend([
                    xo,
                    xo + Vec3::new(0.081_650, 0.057_735, 0.0),
                    xo + Vec3::new(-0.081_650, 0.057_735, 0.0),
                ]);
                let sign = if n % 2 == 0 { 1.0 } else { -1.0 };
                v.extend([Vec3::new(0.3, -0.2, 0.1) * sign; 3]);
                n += 1;
            }
        }
    }
    let mut state = SimulationState::from_positions(x, SimBox::rectangular(Vec3::repeat(per_side as f64 * spacing)));
    state.v = v;
    (top, state)
}

#[test]
fn test_rigid_water_box_keeps_geometry_and_momentum() {
    init_logger();
    let (top, state) = water_grid(3, 0.7);
    let masses = top.masses();
    let p0 = total_momentum(&masses, &state.v);
    let mut sim = Simulation::new(top, state, spc_force_field(), IntegratorConfig::default()).unwrap();

    sim.simulate(200).unwrap();

    let state = sim.state();
    for settle in sim.topology().constraints.settles() {
        let [o, h1, h2] = settle.atoms();
        assert_relative_eq!((state.x[h1] - state.x[o]).norm(), 0.1, epsilon = 1e-8);
        assert_relative_eq!((state.x[h2] - state.x[o]).norm(), 0.1, epsilon = 1e-8);
        assert_relative_eq!((state.x[h2] - state.x[h1]).norm(), 0.163_299, epsilon = 1e-6);
    }
    assert_relative_eq!(total_momentum(&masses, &state.v), p0, epsilon = 1e-9);
    assert_eq!(state.step, 200);
    assert_relative_eq!(state.time, 0.4, epsilon = 1e-9);
}

/// 27 rigid N2-like molecules on a 3x3x3 grid with deterministic velocities.
fn nitrogen_gas() -> (Topology, SimulationState, PairForceField) {
    let mut top = Topology::new();
    let mut x = Vec::new();
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                let r = top.add_residue("N2", (9 * i + 3 * j + k + 1) as i32);
                let a = top.add_atom(Atom::new("N1", 14.007, 0.0, 0, r)).unwrap();
                let b = top.add_atom(Atom::new("N2", 14.007, 0.0, 0, r)).unwrap();
                top.add_constraint(a, b, 0.11).unwrap();
                let xa = Vec3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * 0.6;
                x.extend([xa, xa + Vec3::new(0.11, 0.0, 0.0)]);
            }
        }
    }
    let mut state = SimulationState::from_positions(x, SimBox::rectangular(Vec3::repeat(1.8)));
    for (i, v) in state.v.iter_mut().enumerate() {
        let t = i as f64;
        *v = Vec3::new((1.3 * t).cos(), (2.1 * t).sin(), (0.7 * t + 1.0).cos()) * 0.8;
    }

    let lj = LjTable::from_sigma_epsilon(&[(0.331, 0.304)]);
    let ff = PairForceField::new(lj, &PairForceFieldConfig::default());
    (top, state, ff)
}

#[test]
fn test_nve_diatomic_gas_conserves_energy() {
    init_logger();
    let (top, state, ff) = nitrogen_gas();
    let masses = top.masses();
    let mut sim = Simulation::new(top, state, ff, IntegratorConfig::default()).unwrap();

    let first = sim.step().unwrap();
    assert!(first.potential != 0.0);
    let baseline = ConservationState::new(first.total_energy(), &masses, &sim.state().x, &sim.state().v);
    assert_relative_eq!(baseline.baseline_energy, first.total_energy());

    let mut worst = 0.0_f64;
    for _ in 1..300 {
        let summary = sim.step().unwrap();
        let monitor = ConservationMonitor::check(
            &baseline,
            summary.total_energy(),
            &masses,
            &sim.state().x,
            &sim.state().v,
        );
        worst = worst.max(monitor.energy_error.abs());
        assert!(monitor.momentum_error.norm() < 1e-8, "{:?}", monitor.momentum_error);
    }
    assert!(worst > 0.0);
    assert!(worst < 1e-2, "relative energy error {worst}");
}

#[test]
fn test_berendsen_thermostat_cools_diatomic_gas() {
    init_logger();
    let (top, state, ff) = nitrogen_gas();
    let config = IntegratorConfig::from_json(
        r#"{
            "dt": 0.002,
            "tcoupl": "berendsen",
            "tc_groups": [{ "ref_t": 300.0, "tau_t": 0.1 }]
        }"#,
    )
    .unwrap();
    let mut sim = Simulation::new(top, state, ff, config).unwrap();

    let first = sim.step().unwrap();
    assert!(first.report.temperatures[0] > 320.0, "{:?}", first.report.temperatures);

    let mut tail = Vec::new();
    for step in 1..600 {
        let summary = sim.step().unwrap();
        if step >= 500 {
            tail.push(summary.report.temperatures[0]);
        }
    }
    let mean = tail.iter().sum::<f64>() / tail.len() as f64;
    assert!((mean - 300.0).abs() < 20.0, "mean temperature {mean}");

    let state = sim.state();
    assert_eq!(sim.topology().constraints.constraints().len(), 27);
    for c in sim.topology().constraints.constraints() {
        assert_relative_eq!((state.x[c.aj] - state.x[c.ai]).norm(), 0.11, max_relative = 1e-3);
    }
}

const WATER_DB: &str = r#"{
    "residues": [{
        "name": "water",
        "water_like": true,
        "sites": [{
            "atom": "OW",
            "protons": [
                {"name": "HW1", "lj_type": 1},
                {"name": "HW2", "lj_type": 1},
                {"name": "HW3", "lj_type": 1}
            ]
        }],
        "subtypes": [
            {"name": "SOL", "protons": ["HW1", "HW2"],
             "charges": {"OW": -0.82, "HW1": 0.41, "HW2": 0.41}},
            {"name": "H3O", "protons": ["HW1", "HW2", "HW3"],
             "charges": {"OW": -0.5, "HW1": 0.5, "HW2": 0.5, "HW3": 0.5}}
        ]
    }],
    "parameters": [{
        "donor": "H3O",
        "acceptor": "SOL",
        "params": {
            "k_1": 20.0, "k_2": 30.0, "k_3": 2.0,
            "m_1": 10.0, "m_2": 5.0, "m_3": 2.0,
            "s": [0.0, 0.0, 0.0], "t": [1.0, 0.0, 0.0], "v": [0.0, 0.0, 0.0],
            "e12_left": [10000.0, 0.0, 0.0], "e12_right": [11000.0, 0.0, 0.0]
        }
    }]
}"#;

/// Hydronium pointing a proton at a neighbouring water, O-O 0.24 nm.
fn hydronium_and_water() -> (Topology, SimulationState) {
    let mut top = Topology::new();
    for (name, number) in [("H3O", 1), ("SOL", 2)] {
        let r = top.add_residue(name, number);
        let o = top.add_atom(Atom::new("OW", 15.9994, 0.0, 0, r)).unwrap();
        for h in ["HW1", "HW2", "HW3"] {
            let a = top.add_atom(Atom::new(h, 1.008, 0.0, 1, r)).unwrap();
            top.add_bond(o, a, 1000.0, 0.1).unwrap();
        }
    }
    let x = vec![
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.1, 1.0, 1.0),
        Vec3::new(0.967, 1.094, 1.0),
        Vec3::new(0.967, 0.953, 0.918),
        Vec3::new(1.24, 1.0, 1.0),
        Vec3::new(1.273, 1.094, 1.0),
        Vec3::new(1.273, 0.953, 1.082),
        Vec3::new(1.34, 1.0, 1.0),
    ];
    let mut state = SimulationState::from_positions(x, SimBox::rectangular(Vec3::repeat(3.0)));
    for (i, v) in state.v.iter_mut().enumerate() {
        let t = i as f64;
        *v = Vec3::new((1.7 * t).sin(), (0.9 * t).cos(), (2.3 * t).sin()) * 0.5;
    }
    (top, state)
}

fn total_charge(top: &Topology) -> f64 {
    top.atoms.iter().map(|a| a.charge).sum()
}

#[test]
fn test_simulation_hops_proton_and_keeps_charge() {
    init_logger();
    let (top, state) = hydronium_and_water();
    let db = QhopDatabase::from_json(WATER_DB).unwrap();
    let config = QhopConfig::from_json(r#"{ "qhopfreq": 2, "dummy_lj_type": 2 }"#).unwrap();
    let mut sim = Simulation::new(top, state, spc_force_field(), IntegratorConfig::default())
        .unwrap()
        .with_qhop(db, config)
        .unwrap();
    assert_relative_eq!(total_charge(sim.topology()), 1.0, epsilon = 1e-12);

    let first = sim.step().unwrap();
    match &first.hop {
        CycleOutcome::Accepted { hop, rescale } => {
            assert_eq!(hop.proton, 1);
            assert!(rescale.is_some());
        }
        other => panic!("expected an accepted hop, got {other:?}"),
    }
    assert_eq!(sim.topology().residues[0].name, "SOL");
    assert_eq!(sim.topology().residues[1].name, "H3O");
    assert_relative_eq!(total_charge(sim.topology()), 1.0, epsilon = 1e-12);

    let second = sim.step().unwrap();
    assert_eq!(second.hop, CycleOutcome::Skipped);
    assert!(sim.state().x.iter().all(|x| x.iter().all(|c| c.is_finite())));

    let stats = sim.engine().unwrap().statistics();
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.accepted, 1);
}

#[test]
fn test_simulation_without_qhop_never_hops() {
    init_logger();
    let (top, state) = hydronium_and_water();
    let mut sim = Simulation::new(top, state, spc_force_field(), IntegratorConfig::default()).unwrap();
    let summary = sim.step().unwrap();
    assert_eq!(summary.hop, CycleOutcome::Skipped);
    assert!(sim.engine().is_none());
    assert!(summary.total_energy().is_finite());
}

#[test]
fn test_state_size_mismatch_is_rejected() {
    let (top, mut state) = hydronium_and_water();
    state.x.pop();
    assert!(Simulation::new(top, state, spc_force_field(), IntegratorConfig::default()).is_err());
}
