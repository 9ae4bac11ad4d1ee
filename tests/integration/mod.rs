mod pipeline_integration;
