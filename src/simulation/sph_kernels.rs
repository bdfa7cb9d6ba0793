use crate::floating_type_mod::{FT, PI};

/**
 * Density kernel W(h, r) = (h^2 - r^2)^3 / (pi * h^8 / 4) for r < h, 0 otherwise.
 *
 * The divisor normalizes the kernel over its 2D support:
 * integral over the disk of radius h of (h^2 - r^2)^3 is pi * h^8 / 4.
 */
pub fn density_kernel(h: FT, r: FT) -> FT {
    if r >= h {
        return 0.;
    }
    let volume = PI * h.powi(8) / 4.;
    let v = h * h - r * r;
    v * v * v / volume
}

/**
 * Radial derivative dW/dr of the density kernel.
 * Zero at r = 0 and for r >= h, negative on (0, h).
 */
pub fn density_kernel_derivative(h: FT, r: FT) -> FT {
    if r >= h {
        return 0.;
    }
    let scale = -24. / (PI * h.powi(8));
    let v = h * h - r * r;
    scale * r * v * v
}

/**
 * Linear equation of state. Negative pressure (attraction) below rest
 * density is intentional for this model.
 */
pub fn density_to_pressure(density: FT, rest_density: FT, stiffness: FT) -> FT {
    (density - rest_density) * stiffness
}

/**
 * Mean of the two one-sided pressures. Using the shared value for the pair
 * makes the force of i on j equal and opposite to the force of j on i
 * regardless of which density the force is later divided by.
 */
pub fn shared_pressure(density_a: FT, density_b: FT, rest_density: FT, stiffness: FT) -> FT {
    let pressure_a = density_to_pressure(density_a, rest_density, stiffness);
    let pressure_b = density_to_pressure(density_b, rest_density, stiffness);
    (pressure_a + pressure_b) / 2.
}

#[test]
fn density_kernel_integration_test() {
    // numerically integrate the kernel over its support; must come out as 1
    let h: FT = 0.35;
    let grid_size = 400;
    let square_len = 2. * h / grid_size as FT;
    let square_area = square_len * square_len;

    let mut integral: FT = 0.;

    for y in 0..grid_size {
        for x in 0..grid_size {
            let px = (x as FT + 0.5) * square_len - h;
            let py = (y as FT + 0.5) * square_len - h;
            let r = (px * px + py * py).sqrt();
            integral += density_kernel(h, r) * square_area;
        }
    }

    println!("Integration of density kernel with h={:.2}: {}", h, integral);
    assert!(integral > 0.99);
    assert!(integral < 1.01);
}

#[test]
fn density_kernel_basic_properties_test() {
    let h: FT = 0.2;

    assert!(density_kernel(h, 0.) > 0.);
    assert_eq!(density_kernel(h, h), 0.);
    assert_eq!(density_kernel(h, h * 10.), 0.);

    // strictly decreasing on [0, h)
    let mut previous = density_kernel(h, 0.);
    for i in 1..100 {
        let r = h * i as FT / 100.;
        let value = density_kernel(h, r);
        assert!(value >= 0.);
        assert!(value < previous, "kernel not decreasing at r={}", r);
        previous = value;
    }

    // continuous at the support boundary
    assert!(density_kernel(h, h * 0.9999) < 1e-3);
}

#[test]
fn density_kernel_derivative_test() {
    let h: FT = 0.3;
    let diff: FT = 1e-4;

    assert_eq!(density_kernel_derivative(h, 0.), 0.);
    assert_eq!(density_kernel_derivative(h, h), 0.);
    assert_eq!(density_kernel_derivative(h, h * 2.), 0.);

    // compare against central finite differences inside the support
    for i in 1..50 {
        let r = h * i as FT / 51.;
        let analytical = density_kernel_derivative(h, r);
        let approx = (density_kernel(h, r + diff * 0.5) - density_kernel(h, r - diff * 0.5)) / diff;
        let absolute_error = analytical - approx;
        println!("r={:.4} analytical={:.4} approx={:.4}", r, analytical, approx);
        assert!(absolute_error.abs() < 0.05 * analytical.abs().max(1.));
        assert!(analytical < 0.);
    }
}

#[test]
fn equation_of_state_test() {
    let rest_density: FT = 0.5;
    let stiffness: FT = 2.;

    assert_eq!(density_to_pressure(rest_density, rest_density, stiffness), 0.);
    assert!(density_to_pressure(rest_density * 2., rest_density, stiffness) > 0.);
    assert!(density_to_pressure(rest_density * 0.5, rest_density, stiffness) < 0.);

    // shared pressure is symmetric in its density arguments
    let p_ab = shared_pressure(0.7, 0.4, rest_density, stiffness);
    let p_ba = shared_pressure(0.4, 0.7, rest_density, stiffness);
    assert_eq!(p_ab, p_ba);
    assert_eq!(
        p_ab,
        (density_to_pressure(0.7, rest_density, stiffness) + density_to_pressure(0.4, rest_density, stiffness)) / 2.
    );
}
