//! Constrained leapfrog integration.
//!
//! [`Integrator`] owns everything that persists between steps: the
//! constraint solver, the molecular graph, the group bookkeeping, the noise
//! stream and the Parrinello-Rahman box velocity. One call to
//! [`Integrator::update`] advances the state by one time step:
//!
//! 1. Berendsen scaling factors from the previous step's group temperatures
//! 2. Velocity update (leapfrog or Langevin) with acceleration, freeze and
//!    electric-field terms
//! 3. Position update and constraints
//! 4. Kinetic energy, pressure and pressure coupling
//! 5. Molecules made whole

use crate::config::{IntegratorConfig, IntegratorKind, PressureCoupling, TemperatureCoupling};
use crate::coupling::{
    ParrinelloRahman, berendsen_pcoupl, berendsen_pscale, berendsen_tcoupl, calc_pressure, coupling_tensor,
};
use crate::error::{MdError, Result, StateDump};
use crate::forcefield::ForceOutput;
use crate::graph::MolGraph;
use crate::random::NoiseSource;
use crate::state::{SimulationState, kinetic_tensor};
use crate::topology::Topology;
use crate::units::{BOLTZ, FIELDFAC};
use hopmd_constraint::{ConstraintError, ConstraintOutput, ConstraintSolver, RotationWarning};
use hopmd_math::{Mat3, Vec3};

/// Observables of one integration step.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Step number after the update.
    pub step: u64,
    /// Half-step averaged kinetic energy (kJ/mol).
    pub kinetic_energy: f64,
    /// Temperature per T-coupling group (K).
    pub temperatures: Vec<f64>,
    /// Velocity scaling factor applied per T-coupling group.
    pub tc_lambda: Vec<f64>,
    /// Pressure tensor (bar).
    pub pressure: Mat3,
    pub constraint_virial: Mat3,
    /// Constraint contribution to dV/dλ.
    pub dvdlambda: f64,
    /// Box scaling matrix applied this step.
    pub mu: Mat3,
    pub rotation_warnings: Vec<RotationWarning>,
}

/// Stateful leapfrog integrator.
#[derive(Debug)]
pub struct Integrator {
    config: IntegratorConfig,
    solver: ConstraintSolver,
    graph: MolGraph,
    masses: Vec<f64>,
    invmass: Vec<f64>,
    tc_atoms: Vec<Vec<usize>>,
    accel_atoms: Vec<Vec<usize>>,
    ndf: Vec<f64>,
    ekinh_old: Vec<Mat3>,
    temperatures: Vec<f64>,
    noise: NoiseSource,
    pr: ParrinelloRahman,
    ref_p: Mat3,
    compress: Mat3,
    last_pressure: Option<Mat3>,
    first_step: bool,
}

/// Group indices of an atom, checked against the configured group count.
fn check_group(kind: &str, atom: usize, group: usize, ngroups: usize) -> Result<()> {
    if group >= ngroups {
        return Err(MdError::InvalidTopology(format!(
            "atom {atom} is in {kind} group {group} but only {ngroups} are configured"
        )));
    }
    Ok(())
}

impl Integrator {
    pub fn new(topology: &Topology, config: IntegratorConfig) -> Result<Self> {
        config.validate()?;
        let natoms = topology.natoms();
        let ntc = config.tc_groups.len();
        let nacc = config.accel_groups.len();

        let mut tc_atoms = vec![Vec::new(); ntc];
        let mut accel_atoms = vec![Vec::new(); nacc];
        let masses = topology.masses();
        let mut invmass = vec![0.0; natoms];
        let mut ndf = vec![0.0; ntc];

        for (i, atom) in topology.atoms.iter().enumerate() {
            check_group("temperature-coupling", i, atom.tc_group, ntc)?;
            check_group("acceleration", i, atom.accel_group, nacc)?;
            check_group("freeze", i, atom.freeze_group, config.freeze_groups.len())?;
            tc_atoms[atom.tc_group].push(i);
            accel_atoms[atom.accel_group].push(i);

            let freeze = config.freeze_groups[atom.freeze_group];
            let free_dims = freeze.iter().filter(|&&f| !f).count();
            if atom.mass > 0.0 {
                ndf[atom.tc_group] += free_dims as f64;
                if free_dims > 0 {
                    invmass[i] = 1.0 / atom.mass;
                }
            }
        }

        let constraints = &topology.constraints;
        for c in constraints.constraints() {
            ndf[topology.atoms[c.ai].tc_group] -= 0.5;
            ndf[topology.atoms[c.aj].tc_group] -= 0.5;
        }
        for s in constraints.settles() {
            for a in s.atoms() {
                ndf[topology.atoms[a].tc_group] -= 1.0;
            }
        }

        let solver = ConstraintSolver::new(constraints.clone(), invmass.clone(), &config.constraints)?;
        let graph = MolGraph::from_topology(topology);
        let noise = NoiseSource::new(config.rng, config.seed);
        let ref_p = coupling_tensor(config.pcoupl_type, &config.ref_p);
        let compress = coupling_tensor(config.pcoupl_type, &config.compressibility);

        log::info!(
            "integrator: {:?}, dt {} ps, {} atoms, {} T-groups, ndf {:?}, T-coupling {:?}, P-coupling {:?}",
            config.integrator,
            config.dt,
            natoms,
            ntc,
            ndf,
            config.tcoupl,
            config.pcoupl
        );

        Ok(Self {
            ekinh_old: vec![Mat3::zeros(); ntc],
            temperatures: vec![0.0; ntc],
            config,
            solver,
            graph,
            masses,
            invmass,
            tc_atoms,
            accel_atoms,
            ndf,
            noise,
            pr: ParrinelloRahman::new(),
            ref_p,
            compress,
            last_pressure: None,
            first_step: true,
        })
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    pub fn dt(&self) -> f64 {
        self.config.dt
    }

    pub fn constraints(&self) -> &ConstraintSolver {
        &self.solver
    }

    pub fn constraints_mut(&mut self) -> &mut ConstraintSolver {
        &mut self.solver
    }

    /// Degrees of freedom per temperature-coupling group.
    pub fn ndf(&self) -> &[f64] {
        &self.ndf
    }

    /// Group temperatures of the last step.
    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    /// Temperature of all groups together.
    pub fn temperature(&self) -> f64 {
        let ndf: f64 = self.ndf.iter().sum();
        if ndf <= 0.0 {
            return 0.0;
        }
        let ekin: f64 = self
            .temperatures
            .iter()
            .zip(&self.ndf)
            .map(|(t, n)| 0.5 * n * BOLTZ * t)
            .sum();
        2.0 * ekin / (ndf * BOLTZ)
    }

    /// Box velocity of the Parrinello-Rahman barostat.
    pub fn box_velocity(&self) -> &Mat3 {
        &self.pr.boxv
    }

    fn group_temperature(&self, group: usize, ekin: &Mat3) -> f64 {
        let ndf = self.ndf[group];
        if ndf > 0.0 { 2.0 * ekin.trace() / (ndf * BOLTZ) } else { 0.0 }
    }

    fn half_step_ekin(&self, v: &[Vec3]) -> Vec<Mat3> {
        self.tc_atoms
            .iter()
            .map(|atoms| kinetic_tensor(&self.masses, v, Some(atoms)))
            .collect()
    }

    /// Mass-weighted mean velocity of each accelerated group.
    fn group_velocities(&self, v: &[Vec3]) -> Vec<Vec3> {
        self.accel_atoms
            .iter()
            .zip(&self.config.accel_groups)
            .map(|(atoms, accel)| {
                if accel.iter().all(|&a| a == 0.0) {
                    return Vec3::zeros();
                }
                let (mv, m) = atoms
                    .iter()
                    .fold((Vec3::zeros(), 0.0), |(mv, m), &i| (mv + v[i] * self.masses[i], m + self.masses[i]));
                if m > 0.0 { mv / m } else { Vec3::zeros() }
            })
            .collect()
    }

    /// Advance `state` by one step using the forces in `forces`.
    pub fn update(
        &mut self,
        topology: &Topology,
        state: &mut SimulationState,
        forces: &ForceOutput,
    ) -> Result<StepReport> {
        let natoms = topology.natoms();
        state.check(natoms)?;
        if forces.forces.len() != natoms {
            return Err(MdError::AtomCountMismatch {
                expected: natoms,
                found: forces.forces.len(),
            });
        }
        state.f.clone_from(&forces.forces);
        let dt = self.config.dt;

        if self.first_step {
            self.ekinh_old = self.half_step_ekin(&state.v);
            self.temperatures = (0..self.ekinh_old.len())
                .map(|g| self.group_temperature(g, &self.ekinh_old[g]))
                .collect();
        }

        // Temperature coupling from the previous step's temperatures
        let berendsen =
            self.config.tcoupl == TemperatureCoupling::Berendsen && self.config.integrator == IntegratorKind::Leapfrog;
        let tc_lambda: Vec<f64> = self
            .config
            .tc_groups
            .iter()
            .zip(&self.temperatures)
            .map(|(g, &t)| if berendsen { berendsen_tcoupl(t, g.ref_t, g.tau_t, dt) } else { 1.0 })
            .collect();

        let mut pr_mu = None;
        let mut m_couple = Mat3::zeros();
        if self.config.pcoupl == PressureCoupling::ParrinelloRahman {
            let pressure = if self.first_step { None } else { self.last_pressure.as_ref() };
            let out = self.pr.couple(
                self.config.pcoupl_type,
                pressure,
                &self.ref_p,
                &self.compress,
                self.config.tau_p,
                dt,
                &state.sim_box,
                state.step,
            );
            m_couple = out.m;
            pr_mu = Some(out.mu);
        }

        let field: Option<Vec3> = self.config.electric_field.map(|ef| {
            Vec3::new(
                ef.strength(0, state.time),
                ef.strength(1, state.time),
                ef.strength(2, state.time),
            ) * FIELDFAC
        });
        let u = self.group_velocities(&state.v);

        let mut v_new = state.v.clone();
        let mut x_new = state.x.clone();
        for (i, atom) in topology.atoms.iter().enumerate() {
            let freeze = self.config.freeze_groups[atom.freeze_group];
            let accel = Vec3::from(self.config.accel_groups[atom.accel_group]);
            let invm = if atom.mass > 0.0 { 1.0 / atom.mass } else { 0.0 };
            let mut f = forces.forces[i];
            if let Some(e) = field {
                f += e * atom.charge;
            }

            let vn = match self.config.integrator {
                IntegratorKind::Leapfrog => {
                    let lambda = tc_lambda[atom.tc_group];
                    let ug = u[atom.accel_group];
                    let vrel = state.v[i] - ug;
                    ug + accel * dt + (vrel + (f * invm - m_couple * vrel) * dt) * lambda
                }
                IntegratorKind::Langevin => {
                    let gamma = self.config.langevin_gamma;
                    let c = (-gamma * dt).exp();
                    let kt = BOLTZ * self.config.tc_groups[atom.tc_group].ref_t;
                    let sigma = ((1.0 - c * c) * kt * invm).sqrt();
                    let noise = Vec3::new(self.noise.gaussian(), self.noise.gaussian(), self.noise.gaussian());
                    state.v[i] * c + f * (invm * (1.0 - c) / gamma) + accel * dt + noise * sigma
                }
            };

            for d in 0..3 {
                if freeze[d] {
                    v_new[i][d] = 0.0;
                } else {
                    v_new[i][d] = vn[d];
                    x_new[i][d] = state.x[i][d] + vn[d] * dt;
                }
            }
        }

        let mut output = ConstraintOutput::default();
        if !self.solver.is_empty() {
            self.solver.set_lambda(state.fep_lambda);
            output = match self.solver.apply(&state.x, &mut x_new, dt, &state.sim_box) {
                Ok(output) => output,
                Err(source) => return Err(self.constraint_failure(state, &x_new, &v_new, source)),
            };
            let inv_dt = 1.0 / dt;
            for ((v, xn), xo) in v_new.iter_mut().zip(&x_new).zip(&state.x) {
                *v = (xn - xo) * inv_dt;
            }
        }
        state.x = x_new;
        state.v = v_new;

        // Full-step kinetic energy as the average of the two half steps
        let ekinh_new = self.half_step_ekin(&state.v);
        let mut ekin = Mat3::zeros();
        for g in 0..ekinh_new.len() {
            let avg = (self.ekinh_old[g] + ekinh_new[g]) * 0.5;
            self.temperatures[g] = self.group_temperature(g, &avg);
            ekin += avg;
        }
        self.ekinh_old = ekinh_new;

        let virial = forces.virial + output.virial;
        let pressure = calc_pressure(state.sim_box.volume(), &ekin, &virial);

        let mut mu = Mat3::identity();
        match self.config.pcoupl {
            PressureCoupling::None => {}
            PressureCoupling::Berendsen => {
                if state.sim_box.is_periodic() {
                    mu = berendsen_pcoupl(
                        self.config.pcoupl_type,
                        &pressure,
                        &self.ref_p,
                        &self.compress,
                        self.config.tau_p,
                        dt,
                    );
                    berendsen_pscale(&mu, &mut state.x, &mut state.sim_box);
                }
            }
            PressureCoupling::ParrinelloRahman => {
                if let Some(pr_mu) = pr_mu {
                    mu = pr_mu;
                    self.pr.advance_box(&mut state.sim_box, dt);
                    let mu_t = mu.transpose();
                    for x in state.x.iter_mut() {
                        *x = mu_t * *x;
                    }
                }
            }
        }
        self.last_pressure = Some(pressure);

        if self.config.make_whole {
            self.graph.make_whole(&mut state.x, &state.sim_box);
        }

        self.first_step = false;
        state.tc_lambda.clone_from(&tc_lambda);
        state.time += dt;
        state.step += 1;

        Ok(StepReport {
            step: state.step,
            kinetic_energy: ekin.trace(),
            temperatures: self.temperatures.clone(),
            tc_lambda,
            pressure,
            constraint_virial: output.virial,
            dvdlambda: output.dvdlambda,
            mu,
            rotation_warnings: output.rotation_warnings,
        })
    }

    /// Remove the velocity components along the constraints.
    pub fn constrain_velocities(&mut self, state: &mut SimulationState) -> Result<ConstraintOutput> {
        if self.solver.is_empty() {
            return Ok(ConstraintOutput::default());
        }
        self.solver.set_lambda(state.fep_lambda);
        let mut v = state.v.clone();
        match self
            .solver
            .constrain_velocities(&state.x, &mut v, self.config.dt, &state.sim_box)
        {
            Ok(output) => {
                state.v = v;
                Ok(output)
            }
            Err(source) => {
                let x_new: Vec<Vec3> = state.x.iter().zip(&v).map(|(x, v)| x + v * self.config.dt).collect();
                Err(self.constraint_failure(state, &x_new, &v, source))
            }
        }
    }

    fn constraint_failure(
        &self,
        state: &SimulationState,
        x_new: &[Vec3],
        v: &[Vec3],
        source: ConstraintError,
    ) -> MdError {
        let dump = StateDump::new(&state.x, x_new, v, &state.f);
        log::error!("step {}: {}\n{}", state.step, source, dump);
        MdError::Constraint {
            step: state.step,
            source,
            dump: Box::new(dump),
        }
    }

    /// Inverse masses seen by the constraint solver.
    pub fn invmass(&self) -> &[f64] {
        &self.invmass
    }
}
