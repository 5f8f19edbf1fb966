use log::warn;

use crate::{
    body::BodyId,
    error::{SphError, SphResult},
    kernel_selection::KernelSelectionPolicy,
    particle_configuration::{ContactParticleConfiguration, InnerParticleConfiguration},
    sph_kernels::DimensionUtils,
    system::SphSystem,
};

/// Updates the contact configurations of `body` towards each of `interacting_bodies`, one
/// configuration per interacting body in the same order.
pub fn update_interaction_configuration<DU: DimensionUtils<D>, const D: usize>(
    system: &SphSystem<DU, D>,
    body: BodyId,
    interacting_bodies: &[BodyId],
    policy: &KernelSelectionPolicy,
    configurations: &mut [ContactParticleConfiguration<D>],
) -> SphResult<()> {
    if interacting_bodies.len() != configurations.len() {
        return Err(SphError::CountMismatch {
            what: "contact configurations for the interacting bodies",
            expected: interacting_bodies.len(),
            found: configurations.len(),
        });
    }

    let origin = system.body(body);
    for (&target, configuration) in interacting_bodies.iter().zip(configurations.iter_mut()) {
        let target = system.body(target);
        if target.number_of_particles() == 0 {
            warn!("contact body '{}' of '{}' has no particles", target.name(), origin.name());
        }
        origin.update_contact_configuration(target, policy, configuration)?;
    }
    Ok(())
}

/// Neighbors of a body inside of itself.
#[derive(Debug, Clone)]
pub struct InnerRelation<const D: usize> {
    body: BodyId,
    pub configuration: InnerParticleConfiguration<D>,
}

impl<const D: usize> InnerRelation<D> {
    pub fn new(body: BodyId) -> Self {
        InnerRelation {
            body,
            configuration: InnerParticleConfiguration::default(),
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    /// Expects the body's cell lists to be up to date.
    pub fn update_configuration<DU: DimensionUtils<D>>(&mut self, system: &mut SphSystem<DU, D>) -> SphResult<()> {
        system.body_mut(self.body).update_inner_configuration(&mut self.configuration)
    }
}

/// Neighbors of a body in other bodies. A body that only has a contact relation observes the others
/// without interacting with itself.
#[derive(Debug, Clone)]
pub struct ContactRelation<const D: usize> {
    body: BodyId,
    contact_bodies: Vec<BodyId>,
    policy: KernelSelectionPolicy,
    pub configurations: Vec<ContactParticleConfiguration<D>>,
}

impl<const D: usize> ContactRelation<D> {
    pub fn new<DU: DimensionUtils<D>>(
        system: &SphSystem<DU, D>,
        body: BodyId,
        contact_body_names: &[String],
        policy: KernelSelectionPolicy,
    ) -> SphResult<Self> {
        let contact_bodies = contact_body_names
            .iter()
            .map(|name| system.body_id(name))
            .collect::<SphResult<Vec<_>>>()?;
        if contact_bodies.contains(&body) {
            return Err(SphError::SelfContact(system.body(body).name().to_string()));
        }
        Ok(ContactRelation {
            body,
            configurations: vec![ContactParticleConfiguration::default(); contact_bodies.len()],
            contact_bodies,
            policy,
        })
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn contact_bodies(&self) -> &[BodyId] {
        &self.contact_bodies
    }

    pub fn policy(&self) -> KernelSelectionPolicy {
        self.policy
    }

    /// Expects the cell lists of all contact bodies to be up to date.
    pub fn update_configuration<DU: DimensionUtils<D>>(&mut self, system: &SphSystem<DU, D>) -> SphResult<()> {
        update_interaction_configuration(
            system,
            self.body,
            &self.contact_bodies,
            &self.policy,
            &mut self.configurations,
        )
    }
}

/// Inner and contact neighbors of one body.
#[derive(Debug, Clone)]
pub struct ComplexRelation<const D: usize> {
    pub inner: InnerRelation<D>,
    pub contact: ContactRelation<D>,
}

impl<const D: usize> ComplexRelation<D> {
    pub fn new<DU: DimensionUtils<D>>(
        system: &SphSystem<DU, D>,
        body: BodyId,
        contact_body_names: &[String],
        policy: KernelSelectionPolicy,
    ) -> SphResult<Self> {
        Ok(ComplexRelation {
            inner: InnerRelation::new(body),
            contact: ContactRelation::new(system, body, contact_body_names, policy)?,
        })
    }

    pub fn body(&self) -> BodyId {
        self.inner.body()
    }

    pub fn update_configuration<DU: DimensionUtils<D>>(&mut self, system: &mut SphSystem<DU, D>) -> SphResult<()> {
        self.inner.update_configuration(system)?;
        self.contact.update_configuration(system)
    }
}

/// Any of the relations above, as declared in a scene.
#[derive(Debug, Clone)]
pub enum BodyRelation<const D: usize> {
    Inner(InnerRelation<D>),
    Contact(ContactRelation<D>),
    Complex(ComplexRelation<D>),
}

impl<const D: usize> BodyRelation<D> {
    pub fn body(&self) -> BodyId {
        match self {
            BodyRelation::Inner(r) => r.body(),
            BodyRelation::Contact(r) => r.body(),
            BodyRelation::Complex(r) => r.body(),
        }
    }

    pub fn inner(&self) -> Option<&InnerRelation<D>> {
        match self {
            BodyRelation::Inner(r) => Some(r),
            BodyRelation::Complex(r) => Some(&r.inner),
            BodyRelation::Contact(_) => None,
        }
    }

    pub fn contact(&self) -> Option<&ContactRelation<D>> {
        match self {
            BodyRelation::Contact(r) => Some(r),
            BodyRelation::Complex(r) => Some(&r.contact),
            BodyRelation::Inner(_) => None,
        }
    }

    pub fn update_configuration<DU: DimensionUtils<D>>(&mut self, system: &mut SphSystem<DU, D>) -> SphResult<()> {
        match self {
            BodyRelation::Inner(r) => r.update_configuration(system),
            BodyRelation::Contact(r) => r.update_configuration(system),
            BodyRelation::Complex(r) => r.update_configuration(system),
        }
    }
}
