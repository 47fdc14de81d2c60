use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ml_project::training::{
    CandidateCatalog, CrossValidator, Estimator, GridSearchCV, ModelKind, ModelSelector,
    SearchSpaces, SplitDataset,
};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_regression_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);

    // Target as sum of features + noise
    let y = x.rows().into_iter().map(|row| row.sum() + rng.gen::<f64>() * 0.1).collect();
    (x, y)
}

fn split(n_rows: usize, n_features: usize) -> SplitDataset {
    let (x, y) = create_regression_data(n_rows, n_features);
    let n_train = n_rows * 4 / 5;
    SplitDataset::new(
        x.slice(ndarray::s![..n_train, ..]).to_owned(),
        y.slice(ndarray::s![..n_train]).to_owned(),
        x.slice(ndarray::s![n_train.., ..]).to_owned(),
        y.slice(ndarray::s![n_train..]).to_owned(),
    )
    .unwrap()
}

fn bench_grid_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let (x, y) = create_regression_data(*n_rows, 10);

        for kind in [ModelKind::Ridge, ModelKind::DecisionTree, ModelKind::KNeighbors] {
            let estimator = Estimator::new(kind, Some(42));
            let grid = kind.default_grid();
            let search = GridSearchCV::new(CrossValidator::default());

            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), n_rows),
                &(&x, &y),
                |b, (x, y)| b.iter(|| search.fit(black_box(&estimator), &grid, x, y).unwrap()),
            );
        }
    }

    group.finish();
}

fn bench_select_best(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_best");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let data = split(*n_rows, 8);
        let kinds = [
            ModelKind::LinearRegression,
            ModelKind::Ridge,
            ModelKind::Lasso,
            ModelKind::DecisionTree,
        ];

        group.bench_with_input(BenchmarkId::new("linear_and_tree", n_rows), &data, |b, data| {
            b.iter(|| {
                let mut catalog = CandidateCatalog::from_kinds(&kinds, Some(42));
                let spaces = SearchSpaces::defaults_for(&catalog);
                ModelSelector::new()
                    .select_best(black_box(data), &mut catalog, &spaces)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_grid_search, bench_select_best);
criterion_main!(benches);
