use std::io::Write;
use td_hamiltonian::{
    EigshOptions,
    Equation,
    EvolveOptions,
    Operator,
    OperatorError,
    Which,
};

fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir()
        .join(format!("td-hamiltonian-{}-{}.toml", name, std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

// -----------------------------------------------------------------------------

#[test]
fn options_file_drives_an_evolution() {
    let path = write_temp("rk4", r#"
        integrator = "rk4"
        imaginary_time = true

        [stepper]
        max_step = 0.005
    "#);
    let opts = EvolveOptions::from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(opts.equation, Equation::Schrodinger);
    assert!(opts.imaginary_time);

    let H: Operator<f64> = Operator::identity(2);
    let psi0 = ndarray::array![0.6, 0.8];
    let psi = H.evolve_at(&psi0, 0.0, 3.0, &opts).unwrap();
    // uniform decay is undone by renormalization
    assert!((psi[0].re - 0.6).abs() < 1e-9);
    assert!((psi[1].re - 0.8).abs() < 1e-9);
}

#[test]
fn options_round_trip_through_toml() {
    let opts = EvolveOptions::default()
        .with_equation(Equation::LiouvilleVonNeumann)
        .with_lazy(true);
    let doc = toml::to_string(&opts).unwrap();
    assert!(doc.contains("equation = \"LvNE\""));
    assert_eq!(EvolveOptions::from_toml_str(&doc).unwrap(), opts);
}

#[test]
fn invalid_files() {
    let path = write_temp("bad", "equation = \"LvNE\"\nreal_split = true\n");
    let res = EvolveOptions::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(res, Err(OperatorError::UnsupportedForLvne(_))));

    let path = write_temp("syntax", "integrator = \n");
    let res = EvolveOptions::from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(res, Err(OperatorError::Config(_))));
}

#[test]
fn eigensolver_options() {
    let opts: EigshOptions = toml::from_str("k = 2\nwhich = \"largest\"").unwrap();
    assert_eq!(opts.k, 2);
    assert_eq!(opts.which, Which::Largest);
    assert_eq!(opts.tol, EigshOptions::default().tol);
}
