#![allow(dead_code)]

use opentelemetry::metrics::{
    AsyncInstrument, AsyncInstrumentBuilder, Counter, InstrumentBuilder, InstrumentProvider, Meter,
    MeterProvider, ObservableCounter, SyncInstrument,
};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_reconfigurable::config::ConfigProperties;
use opentelemetry_reconfigurable::logs::LoggerDelegate;
use opentelemetry_reconfigurable::metrics::MeterDelegate;
use opentelemetry_reconfigurable::provider::Source;
use opentelemetry_reconfigurable::sdk::{BuiltSdk, PropagatorKind, ProviderSet, SdkFactory};
use opentelemetry_reconfigurable::trace::TracerDelegate;
use opentelemetry_reconfigurable::{ReconfigureResult, ShutdownError};
use opentelemetry_sdk::logs::{InMemoryLogExporter, SdkLoggerProvider};
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub scope: String,
    pub version: Option<String>,
    pub instrument: String,
    pub value: u64,
}

type Collect = Box<dyn Fn() + Send + Sync>;

/// Meter provider recording `u64` counter measurements and running
/// observable callbacks on `collect`.
#[derive(Clone, Default)]
pub struct RecordingMeterProvider {
    measurements: Arc<Mutex<Vec<Measurement>>>,
    collectors: Arc<Mutex<Vec<Collect>>>,
}

impl RecordingMeterProvider {
    pub fn measurements(&self) -> Vec<Measurement> {
        self.measurements.lock().unwrap().clone()
    }

    pub fn collect(&self) -> Vec<Measurement> {
        self.measurements.lock().unwrap().clear();
        for collect in self.collectors.lock().unwrap().iter() {
            collect();
        }
        self.measurements()
    }
}

impl MeterProvider for RecordingMeterProvider {
    fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        Meter::new(Arc::new(RecordingInstruments {
            scope,
            measurements: self.measurements.clone(),
            collectors: self.collectors.clone(),
        }))
    }
}

struct RecordingInstruments {
    scope: InstrumentationScope,
    measurements: Arc<Mutex<Vec<Measurement>>>,
    collectors: Arc<Mutex<Vec<Collect>>>,
}

impl RecordingInstruments {
    fn recorder(&self, instrument: &str) -> Arc<Recorder> {
        Arc::new(Recorder {
            template: Measurement {
                scope: self.scope.name().to_owned(),
                version: self.scope.version().map(str::to_owned),
                instrument: instrument.to_owned(),
                value: 0,
            },
            measurements: self.measurements.clone(),
        })
    }
}

struct Recorder {
    template: Measurement,
    measurements: Arc<Mutex<Vec<Measurement>>>,
}

impl SyncInstrument<u64> for Recorder {
    fn measure(&self, value: u64, _attributes: &[KeyValue]) {
        self.observe(value, _attributes);
    }
}

impl AsyncInstrument<u64> for Recorder {
    fn observe(&self, value: u64, _attributes: &[KeyValue]) {
        self.measurements.lock().unwrap().push(Measurement {
            value,
            ..self.template.clone()
        });
    }
}

impl InstrumentProvider for RecordingInstruments {
    fn u64_counter(&self, builder: InstrumentBuilder<'_, Counter<u64>>) -> Counter<u64> {
        Counter::new(self.recorder(&builder.name))
    }

    fn u64_observable_counter(
        &self,
        builder: AsyncInstrumentBuilder<'_, ObservableCounter<u64>, u64>,
    ) -> ObservableCounter<u64> {
        let recorder = self.recorder(&builder.name);
        let callbacks = builder.callbacks;
        self.collectors.lock().unwrap().push(Box::new(move || {
            for callback in &callbacks {
                callback(&*recorder);
            }
        }));
        ObservableCounter::new()
    }
}

/// One SDK generation built by [`InMemoryFactory`].
#[derive(Clone)]
pub struct Generation {
    pub spans: InMemorySpanExporter,
    pub logs: InMemoryLogExporter,
    pub metrics: RecordingMeterProvider,
    pub shut_down: Arc<AtomicBool>,
}

struct GenerationSet {
    tracer_provider: SdkTracerProvider,
    logger_provider: SdkLoggerProvider,
    generation: Generation,
}

impl ProviderSet for GenerationSet {
    fn tracer_source(&self) -> Arc<dyn Source<TracerDelegate>> {
        Arc::new(self.tracer_provider.clone())
    }

    fn meter_source(&self) -> Arc<dyn Source<MeterDelegate>> {
        Arc::new(self.generation.metrics.clone())
    }

    fn logger_source(&self) -> Arc<dyn Source<LoggerDelegate>> {
        Arc::new(self.logger_provider.clone())
    }

    fn shutdown(&self) -> Result<(), ShutdownError> {
        self.generation.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory building in-memory SDKs and keeping every generation around for
/// inspection.
#[derive(Clone, Default)]
pub struct InMemoryFactory {
    generations: Arc<Mutex<Vec<Generation>>>,
}

impl InMemoryFactory {
    pub fn generation(&self, index: usize) -> Generation {
        self.generations.lock().unwrap()[index].clone()
    }

    pub fn generation_count(&self) -> usize {
        self.generations.lock().unwrap().len()
    }
}

impl SdkFactory for InMemoryFactory {
    fn build(&self, config: &ConfigProperties, resource: &Resource) -> ReconfigureResult<BuiltSdk> {
        let generation = Generation {
            spans: InMemorySpanExporter::default(),
            logs: InMemoryLogExporter::default(),
            metrics: RecordingMeterProvider::default(),
            shut_down: Arc::new(AtomicBool::new(false)),
        };
        let set = GenerationSet {
            tracer_provider: SdkTracerProvider::builder()
                .with_resource(resource.clone())
                .with_simple_exporter(generation.spans.clone())
                .build(),
            logger_provider: SdkLoggerProvider::builder()
                .with_resource(resource.clone())
                .with_simple_exporter(generation.logs.clone())
                .build(),
            generation: generation.clone(),
        };
        self.generations.lock().unwrap().push(generation);
        Ok(BuiltSdk {
            providers: Arc::new(set),
            config: config.clone(),
            resource: resource.clone(),
            log_exporters: Vec::new(),
            propagators: vec![PropagatorKind::TraceContext, PropagatorKind::Baggage],
        })
    }
}

pub fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}
