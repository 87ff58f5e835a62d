// hf-core/src/units.rs

use uom::si::f64::{
    Acceleration as UomAcceleration, Force as UomForce, Length as UomLength, Mass as UomMass,
    Time as UomTime, Velocity as UomVelocity,
};

// Public canonical unit types (SI, f64)
pub type Accel = UomAcceleration;
pub type Force = UomForce;
pub type Length = UomLength;
pub type Mass = UomMass;
pub type Time = UomTime;
pub type Velocity = UomVelocity;

#[inline]
pub fn kg(v: f64) -> Mass {
    use uom::si::mass::kilogram;
    Mass::new::<kilogram>(v)
}

#[inline]
pub fn m(v: f64) -> Length {
    use uom::si::length::meter;
    Length::new::<meter>(v)
}

#[inline]
pub fn mm(v: f64) -> Length {
    use uom::si::length::millimeter;
    Length::new::<millimeter>(v)
}

#[inline]
pub fn s(v: f64) -> Time {
    use uom::si::time::second;
    Time::new::<second>(v)
}

#[inline]
pub fn mps(v: f64) -> Velocity {
    use uom::si::velocity::meter_per_second;
    Velocity::new::<meter_per_second>(v)
}

#[inline]
pub fn mps2(v: f64) -> Accel {
    use uom::si::acceleration::meter_per_second_squared;
    Accel::new::<meter_per_second_squared>(v)
}

#[inline]
pub fn newton(v: f64) -> Force {
    use uom::si::force::newton;
    Force::new::<newton>(v)
}

/// Kinetic energy `½·m·v²` in joules, used to report hammer impact energy.
pub fn kinetic_energy_j(mass: Mass, velocity: Velocity) -> f64 {
    0.5 * mass.value * velocity.value * velocity.value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_store_si() {
        assert_eq!(kg(0.5).value, 0.5);
        assert_eq!(m(2.0).value, 2.0);
        assert!((mm(30.0).value - 0.03).abs() < 1e-15);
        assert_eq!(s(0.1).value, 0.1);
        assert_eq!(mps(1.5).value, 1.5);
        assert_eq!(mps2(-2.5).value, -2.5);
        assert_eq!(newton(10.0).value, 10.0);
    }

    #[test]
    fn impact_energy() {
        let e = kinetic_energy_j(kg(2.0), mps(3.0));
        assert!((e - 9.0).abs() < 1e-12);
    }
}
