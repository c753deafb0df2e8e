//! Mapping between `poolnode-model` types and the generated protobuf messages.

use poolnode_model::{Job, JobFilter, JobInput, JobParam, Price};

use crate::proto;

impl From<proto::Job> for Job {
    fn from(job: proto::Job) -> Self {
        Job {
            id: job.id,
            kind: job.kind,
            run_on: job.run_on,
            customer: job.customer,
            description: job.description,
            params: job.param.into_iter().map(JobParam::from).collect(),
            inputs: job.input.into_iter().map(JobInput::from).collect(),
            output_format: job.output_format,
        }
    }
}

impl From<proto::JobParam> for JobParam {
    fn from(p: proto::JobParam) -> Self {
        JobParam {
            key: p.key,
            values: p.value,
        }
    }
}

impl From<proto::JobInput> for JobInput {
    fn from(i: proto::JobInput) -> Self {
        JobInput {
            data: i.data,
            input_type: i.input_type,
            marker: i.marker,
            source: i.source,
        }
    }
}

impl From<&JobFilter> for proto::JobFilter {
    fn from(f: &JobFilter) -> Self {
        proto::JobFilter {
            filter_by_run_on: f.run_on.clone(),
            filter_by_customer: f.customer.clone(),
            filter_by_description: f.description.clone(),
            filter_by_id: f.id.clone(),
            filter_by_kind: f.kind,
        }
    }
}

impl From<&Price> for proto::Price {
    fn from(p: &Price) -> Self {
        proto::Price {
            amount: p.amount,
            currency: p.currency.clone(),
            protocol: p.protocol.clone(),
        }
    }
}
